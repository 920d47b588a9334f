use crate::db::models::Exam;
use crate::db::types::ExamStatus;

pub(crate) const COLUMNS: &str = "\
    id, class_id, created_by, title, description, duration_minutes, total_marks, \
    max_attempts, evaluation_mode, start_time, end_time, status, settings, \
    created_at, updated_at, published_at, started_at, closed_at, \
    evaluation_started_at, results_published_at, papers, papers_generated_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list_by_status(
    executor: impl sqlx::PgExecutor<'_>,
    status: ExamStatus,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams WHERE status = $1 ORDER BY created_at"
    ))
    .bind(status)
    .fetch_all(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    exam: &Exam,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exams (
            id, class_id, created_by, title, description, duration_minutes, total_marks,
            max_attempts, evaluation_mode, start_time, end_time, status, settings,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
        ON CONFLICT DO NOTHING",
    )
    .bind(&exam.id)
    .bind(&exam.class_id)
    .bind(&exam.created_by)
    .bind(&exam.title)
    .bind(&exam.description)
    .bind(exam.duration_minutes)
    .bind(exam.total_marks)
    .bind(exam.max_attempts)
    .bind(exam.evaluation_mode)
    .bind(exam.start_time)
    .bind(exam.end_time)
    .bind(exam.status)
    .bind(&exam.settings)
    .bind(exam.created_at)
    .bind(exam.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Writes every mutable column; returns false when the row is gone.
pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    exam: &Exam,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET
            title = $2,
            description = $3,
            duration_minutes = $4,
            total_marks = $5,
            max_attempts = $6,
            evaluation_mode = $7,
            start_time = $8,
            end_time = $9,
            status = $10,
            settings = $11,
            updated_at = $12,
            published_at = $13,
            started_at = $14,
            closed_at = $15,
            evaluation_started_at = $16,
            results_published_at = $17,
            papers = $18,
            papers_generated_at = $19
         WHERE id = $1",
    )
    .bind(&exam.id)
    .bind(&exam.title)
    .bind(&exam.description)
    .bind(exam.duration_minutes)
    .bind(exam.total_marks)
    .bind(exam.max_attempts)
    .bind(exam.evaluation_mode)
    .bind(exam.start_time)
    .bind(exam.end_time)
    .bind(exam.status)
    .bind(&exam.settings)
    .bind(exam.updated_at)
    .bind(exam.published_at)
    .bind(exam.started_at)
    .bind(exam.closed_at)
    .bind(exam.evaluation_started_at)
    .bind(exam.results_published_at)
    .bind(&exam.papers)
    .bind(exam.papers_generated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}
