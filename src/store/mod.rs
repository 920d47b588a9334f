mod memory;
mod postgres;

pub(crate) use memory::MemoryStore;
pub(crate) use postgres::PgStore;

use async_trait::async_trait;

use crate::db::models::{Attempt, Class, Enrollment, Exam, User};
use crate::db::types::{AttemptStatus, ExamStatus};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("conflicting write for {entity} {id}")]
    Conflict { entity: &'static str, id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AttemptFilter {
    pub(crate) exam_id: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) status: Option<AttemptStatus>,
}

impl AttemptFilter {
    pub(crate) fn for_exam(exam_id: &str) -> Self {
        Self { exam_id: Some(exam_id.to_string()), ..Self::default() }
    }

    pub(crate) fn for_student(exam_id: &str, student_id: &str) -> Self {
        Self {
            exam_id: Some(exam_id.to_string()),
            student_id: Some(student_id.to_string()),
            status: None,
        }
    }

    pub(crate) fn with_status(mut self, status: AttemptStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn matches(&self, attempt: &Attempt) -> bool {
        self.exam_id.as_deref().map_or(true, |id| attempt.exam_id == id)
            && self.student_id.as_deref().map_or(true, |id| attempt.student_id == id)
            && self.status.map_or(true, |status| attempt.status == status)
    }
}

/// Persistence for the lifecycle engine.
///
/// `create_attempt` must refuse a second in-progress attempt for the same exam and
/// student, and a duplicate attempt number, by returning [`StoreError::Conflict`].
#[async_trait]
pub(crate) trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_class(&self, id: &str) -> Result<Option<Class>, StoreError>;
    async fn find_enrollment(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<Option<Enrollment>, StoreError>;
    async fn list_enrollments(&self, class_id: &str) -> Result<Vec<Enrollment>, StoreError>;

    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, StoreError>;
    async fn create_exam(&self, exam: &Exam) -> Result<(), StoreError>;
    async fn save_exam(&self, exam: &Exam) -> Result<(), StoreError>;
    async fn delete_exam(&self, id: &str) -> Result<bool, StoreError>;
    async fn list_exams_by_status(&self, status: ExamStatus) -> Result<Vec<Exam>, StoreError>;

    async fn find_attempt(&self, id: &str) -> Result<Option<Attempt>, StoreError>;
    async fn list_attempts(&self, filter: &AttemptFilter) -> Result<Vec<Attempt>, StoreError>;
    async fn count_attempts(&self, filter: &AttemptFilter) -> Result<i64, StoreError>;
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;
    async fn save_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    async fn find_attempt_by(&self, filter: &AttemptFilter) -> Result<Option<Attempt>, StoreError> {
        Ok(self.list_attempts(filter).await?.into_iter().next())
    }
}
