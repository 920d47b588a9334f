use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::db::models::{Attempt, User};
use crate::schemas::attempt::{
    AttemptResponse, HeartbeatResponse, ScoreRequest, SubmitRequest, ViolationRequest,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/heartbeat", post(heartbeat))
        .route("/:attempt_id/violations", post(record_violation))
        .route("/:attempt_id/score", post(record_score))
}

/// Proctoring signals only come from the student sitting the attempt.
async fn owned_attempt(
    state: &AppState,
    student: &User,
    attempt_id: &str,
) -> Result<Attempt, ApiError> {
    let attempt = state
        .store()
        .find_attempt(attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
        .ok_or_else(|| ApiError::NotFound(format!("attempt {attempt_id} not found")))?;

    if attempt.student_id != student.id {
        return Err(ApiError::forbidden("Attempt belongs to another student"));
    }
    Ok(attempt)
}

async fn get_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let (_, attempt) = state.engine().view_attempt(&attempt_id, &user.id).await?;
    Ok(Json(attempt.into()))
}

async fn submit_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    payload: Option<Json<SubmitRequest>>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = state
        .engine()
        .submit(&attempt_id, Some(&student.id), payload.answer_artifact)
        .await?;
    Ok(Json(attempt.into()))
}

async fn heartbeat(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    owned_attempt(&state, &student, &attempt_id).await?;

    let attempt = state.engine().heartbeat(&attempt_id).await?;
    let exam = state
        .store()
        .find_exam(&attempt.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound(format!("exam {} not found", attempt.exam_id)))?;
    // heartbeat stamps last_active_at with the engine clock
    let now = attempt.integrity.last_active_at;
    Ok(Json(HeartbeatResponse::new(&exam, attempt, now)))
}

async fn record_violation(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<ViolationRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    owned_attempt(&state, &student, &attempt_id).await?;

    let attempt = state.engine().record_violation(&attempt_id, &payload.violation_type).await?;
    Ok(Json(attempt.into()))
}

async fn record_score(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = state
        .engine()
        .record_manual_score(&attempt_id, &teacher.id, payload.score, payload.feedback)
        .await?;
    Ok(Json(attempt.into()))
}
