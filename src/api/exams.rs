use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::lifecycle::{Eligibility, EvaluationSummary};
use crate::schemas::attempt::AttemptResponse;
use crate::schemas::exam::{ExamCreate, ExamResponse, ExamUpdate, PaperResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam))
        .route("/:exam_id", get(get_exam).patch(update_exam).delete(delete_exam))
        .route("/:exam_id/papers", post(generate_papers))
        .route("/:exam_id/papers/mine", get(my_paper))
        .route("/:exam_id/publish", post(publish_exam))
        .route("/:exam_id/start", post(start_exam))
        .route("/:exam_id/close", post(close_exam))
        .route("/:exam_id/start-evaluation", post(start_evaluation))
        .route("/:exam_id/publish-results", post(publish_results))
        .route("/:exam_id/evaluate", post(trigger_evaluation))
        .route("/:exam_id/eligibility", get(check_eligibility))
        .route("/:exam_id/attempts", get(list_attempts).post(start_attempt))
}

async fn create_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = state.engine().create_exam(&teacher.id, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(exam.into())))
}

async fn get_exam(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().view_exam(&exam_id, &user.id).await?;
    Ok(Json(exam.into()))
}

async fn update_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = state.engine().update_exam(&exam_id, &teacher.id, payload.into()).await?;
    Ok(Json(exam.into()))
}

async fn delete_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine().delete_exam(&exam_id, &teacher.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate_papers(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().generate_papers(&exam_id, &teacher.id).await?;
    Ok(Json(exam.into()))
}

async fn my_paper(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<PaperResponse>, ApiError> {
    let paper = state.engine().paper_for_student(&exam_id, &student.id).await?;
    Ok(Json(PaperResponse::new(exam_id, paper)))
}

async fn publish_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().publish(&exam_id, &teacher.id).await?;
    Ok(Json(exam.into()))
}

async fn start_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().start(&exam_id, Some(&teacher.id)).await?;
    Ok(Json(exam.into()))
}

async fn close_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().close(&exam_id, Some(&teacher.id)).await?;
    Ok(Json(exam.into()))
}

async fn start_evaluation(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().start_evaluation(&exam_id, &teacher.id).await?;
    Ok(Json(exam.into()))
}

async fn publish_results(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.engine().publish_results(&exam_id, &teacher.id).await?;
    Ok(Json(exam.into()))
}

async fn trigger_evaluation(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<EvaluationSummary>, ApiError> {
    let summary = state.engine().trigger_evaluation(&exam_id, Some(&teacher.id)).await?;
    Ok(Json(summary))
}

async fn check_eligibility(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<Eligibility>, ApiError> {
    let eligibility = state.engine().check_eligibility(&exam_id, &student.id).await?;
    Ok(Json(eligibility))
}

async fn list_attempts(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let attempts = state.engine().list_attempts(&exam_id, &teacher.id).await?;
    Ok(Json(attempts.into_iter().map(AttemptResponse::from).collect()))
}

async fn start_attempt(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    let attempt = state.engine().start_attempt(&exam_id, &student.id).await?;
    Ok((StatusCode::CREATED, Json(attempt.into())))
}
