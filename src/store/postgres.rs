use async_trait::async_trait;
use sqlx::PgPool;

use super::{AttemptFilter, Store, StoreError};
use crate::db::models::{Attempt, Class, Enrollment, Exam, User};
use crate::db::types::ExamStatus;
use crate::repositories::{self, attempts::AttemptQuery};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query(filter: &AttemptFilter) -> AttemptQuery<'_> {
    AttemptQuery {
        exam_id: filter.exam_id.as_deref(),
        student_id: filter.student_id.as_deref(),
        status: filter.status,
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(repositories::users::find_by_id(&self.pool, id).await?)
    }

    async fn find_class(&self, id: &str) -> Result<Option<Class>, StoreError> {
        Ok(repositories::classes::find_by_id(&self.pool, id).await?)
    }

    async fn find_enrollment(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(repositories::classes::find_enrollment(&self.pool, class_id, student_id).await?)
    }

    async fn list_enrollments(&self, class_id: &str) -> Result<Vec<Enrollment>, StoreError> {
        Ok(repositories::classes::list_enrollments(&self.pool, class_id).await?)
    }

    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(repositories::exams::find_by_id(&self.pool, id).await?)
    }

    async fn create_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        if !repositories::exams::create(&self.pool, exam).await? {
            return Err(StoreError::Conflict { entity: "exam", id: exam.id.clone() });
        }
        Ok(())
    }

    async fn save_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        if !repositories::exams::update(&self.pool, exam).await? {
            return Err(StoreError::Conflict { entity: "exam", id: exam.id.clone() });
        }
        Ok(())
    }

    async fn delete_exam(&self, id: &str) -> Result<bool, StoreError> {
        Ok(repositories::exams::delete_by_id(&self.pool, id).await?)
    }

    async fn list_exams_by_status(&self, status: ExamStatus) -> Result<Vec<Exam>, StoreError> {
        Ok(repositories::exams::list_by_status(&self.pool, status).await?)
    }

    async fn find_attempt(&self, id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(repositories::attempts::find_by_id(&self.pool, id).await?)
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> Result<Vec<Attempt>, StoreError> {
        Ok(repositories::attempts::list(&self.pool, query(filter)).await?)
    }

    async fn count_attempts(&self, filter: &AttemptFilter) -> Result<i64, StoreError> {
        Ok(repositories::attempts::count(&self.pool, query(filter)).await?)
    }

    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        if !repositories::attempts::create(&self.pool, attempt).await? {
            return Err(StoreError::Conflict { entity: "attempt", id: attempt.id.clone() });
        }
        Ok(())
    }

    async fn save_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        if !repositories::attempts::update(&self.pool, attempt).await? {
            return Err(StoreError::Conflict { entity: "attempt", id: attempt.id.clone() });
        }
        Ok(())
    }
}
