use time::OffsetDateTime;

use crate::core::time::format_offset;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub(crate) enum LifecycleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("invalid {entity} transition: {from}→{to}")]
    InvalidTransition { entity: &'static str, from: &'static str, to: &'static str },
    #[error("exam {exam_id} cannot start before {}", instant(.starts_at))]
    TooEarly { exam_id: String, starts_at: OffsetDateTime },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    LimitReached(String),
    #[error("{0}")]
    Conflict(String),
    #[error("exam {0} has no submitted attempts with an answer sheet to evaluate")]
    EmptyBatch(String),
    #[error("upstream service unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl LifecycleError {
    pub(crate) fn exam_not_found(id: &str) -> Self {
        Self::NotFound { entity: "exam", id: id.to_string() }
    }

    pub(crate) fn attempt_not_found(id: &str) -> Self {
        Self::NotFound { entity: "attempt", id: id.to_string() }
    }

    pub(crate) fn user_not_found(id: &str) -> Self {
        Self::NotFound { entity: "user", id: id.to_string() }
    }
}

fn instant(value: &OffsetDateTime) -> String {
    format_offset(*value)
}

pub(crate) type LifecycleResult<T> = Result<T, LifecycleError>;
