use crate::db::models::{Class, Enrollment};

pub(crate) const CLASS_COLUMNS: &str = "id, title, teacher_id, created_at";
pub(crate) const ENROLLMENT_COLUMNS: &str = "id, class_id, student_id, status, enrolled_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>(&format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_enrollment(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: &str,
    student_id: &str,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE class_id = $1 AND student_id = $2"
    ))
    .bind(class_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_enrollments(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: &str,
) -> Result<Vec<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE class_id = $1 ORDER BY enrolled_at"
    ))
    .bind(class_id)
    .fetch_all(executor)
    .await
}
