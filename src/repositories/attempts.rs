use sqlx::{Postgres, QueryBuilder};

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, status, started_at, submitted_at, \
    evaluated_at, submission_reason, score, feedback, answer_artifact, integrity, updated_at";

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AttemptQuery<'a> {
    pub(crate) exam_id: Option<&'a str>,
    pub(crate) student_id: Option<&'a str>,
    pub(crate) status: Option<AttemptStatus>,
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: AttemptQuery<'a>) {
    builder.push(" WHERE TRUE");
    if let Some(exam_id) = query.exam_id {
        builder.push(" AND exam_id = ");
        builder.push_bind(exam_id);
    }
    if let Some(student_id) = query.student_id {
        builder.push(" AND student_id = ");
        builder.push_bind(student_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list(
    executor: impl sqlx::PgExecutor<'_>,
    query: AttemptQuery<'_>,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM attempts"));
    push_filters(&mut builder, query);
    builder.push(" ORDER BY started_at, attempt_number");

    builder.build_query_as::<Attempt>().fetch_all(executor).await
}

pub(crate) async fn count(
    executor: impl sqlx::PgExecutor<'_>,
    query: AttemptQuery<'_>,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM attempts");
    push_filters(&mut builder, query);

    builder.build_query_scalar::<i64>().fetch_one(executor).await
}

/// Inserts the attempt; false means a uniqueness index rejected it.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &Attempt,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (
            id, exam_id, student_id, attempt_number, status, started_at, integrity, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        ON CONFLICT DO NOTHING",
    )
    .bind(&attempt.id)
    .bind(&attempt.exam_id)
    .bind(&attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(attempt.status)
    .bind(attempt.started_at)
    .bind(&attempt.integrity)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &Attempt,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET
            status = $2,
            submitted_at = $3,
            evaluated_at = $4,
            submission_reason = $5,
            score = $6,
            feedback = $7,
            answer_artifact = $8,
            integrity = $9,
            updated_at = $10
         WHERE id = $1",
    )
    .bind(&attempt.id)
    .bind(attempt.status)
    .bind(attempt.submitted_at)
    .bind(attempt.evaluated_at)
    .bind(attempt.submission_reason)
    .bind(attempt.score)
    .bind(&attempt.feedback)
    .bind(&attempt.answer_artifact)
    .bind(&attempt.integrity)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
