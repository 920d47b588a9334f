use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::format_offset;
use crate::db::models::{Attempt, Exam, IntegrityRecord};
use crate::db::types::{AttemptStatus, SubmissionReason};
use crate::services::attempt_timing::{attempt_deadline, remaining_seconds};

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[serde(default, alias = "answerSheet", alias = "answerArtifact")]
    #[validate(length(min = 1, max = 1024, message = "answer_artifact must be 1-1024 characters"))]
    pub(crate) answer_artifact: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ViolationRequest {
    #[serde(rename = "type", alias = "violation_type", alias = "violationType")]
    #[validate(length(min = 1, message = "type must not be empty"))]
    pub(crate) violation_type: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScoreRequest {
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    #[validate(length(max = 10000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) evaluated_at: Option<String>,
    pub(crate) submission_reason: Option<SubmissionReason>,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) answer_artifact: Option<String>,
    pub(crate) integrity: IntegrityRecord,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            started_at: format_offset(attempt.started_at),
            submitted_at: attempt.submitted_at.map(format_offset),
            evaluated_at: attempt.evaluated_at.map(format_offset),
            submission_reason: attempt.submission_reason,
            score: attempt.score,
            feedback: attempt.feedback,
            answer_artifact: attempt.answer_artifact,
            integrity: attempt.integrity.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HeartbeatResponse {
    pub(crate) status: AttemptStatus,
    pub(crate) auto_submitted: bool,
    pub(crate) deadline: String,
    pub(crate) remaining_seconds: i64,
    pub(crate) attempt: AttemptResponse,
}

impl HeartbeatResponse {
    pub(crate) fn new(exam: &Exam, attempt: Attempt, now: OffsetDateTime) -> Self {
        let remaining = if attempt.status == AttemptStatus::InProgress {
            remaining_seconds(exam, &attempt, now)
        } else {
            0
        };
        Self {
            status: attempt.status,
            auto_submitted: attempt.integrity.auto_submitted,
            deadline: format_offset(attempt_deadline(exam, &attempt)),
            remaining_seconds: remaining,
            attempt: attempt.into(),
        }
    }
}
