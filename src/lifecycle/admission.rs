use serde::Serialize;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ExamEngine, LifecycleError, LifecycleResult};
use crate::db::models::{Attempt, Exam, IntegrityRecord};
use crate::db::types::{AttemptStatus, EnrollmentStatus, ExamStatus, UserRole};
use crate::store::{AttemptFilter, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Eligibility {
    pub(crate) attempt_number: i32,
    pub(crate) attempts_remaining: i32,
}

impl ExamEngine {
    /// Runs every admission check without creating an attempt.
    pub(crate) async fn check_eligibility(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> LifecycleResult<Eligibility> {
        let (_, eligibility) = self.admit(exam_id, student_id, self.now()).await?;
        Ok(eligibility)
    }

    pub(crate) async fn start_attempt(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> LifecycleResult<Attempt> {
        let _guard = self.locks().admission(exam_id, student_id).await;
        let now = self.now();
        let (exam, eligibility) = self.admit(exam_id, student_id, now).await?;

        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            exam_id: exam.id.clone(),
            student_id: student_id.to_string(),
            attempt_number: eligibility.attempt_number,
            status: AttemptStatus::InProgress,
            started_at: now,
            submitted_at: None,
            evaluated_at: None,
            submission_reason: None,
            score: None,
            feedback: None,
            answer_artifact: None,
            integrity: Json(IntegrityRecord::new(now)),
            updated_at: now,
        };

        match self.store().create_attempt(&attempt).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                return Err(LifecycleError::Conflict(format!(
                    "student {student_id} already has an attempt in progress for exam {exam_id}"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        metrics::counter!("attempts_started_total").increment(1);
        tracing::info!(
            student_id = %student_id,
            exam_id = %exam.id,
            attempt_id = %attempt.id,
            attempt_number = attempt.attempt_number,
            action = "attempt_start",
            "Attempt started"
        );
        Ok(attempt)
    }

    async fn admit(
        &self,
        exam_id: &str,
        student_id: &str,
        now: OffsetDateTime,
    ) -> LifecycleResult<(Exam, Eligibility)> {
        let student = self
            .store()
            .find_user(student_id)
            .await?
            .ok_or_else(|| LifecycleError::user_not_found(student_id))?;
        if student.role != UserRole::Student || !student.is_active {
            return Err(LifecycleError::Forbidden(format!(
                "user {student_id} is not an active student"
            )));
        }

        let exam = self.load_exam(exam_id).await?;
        ensure_window_open(&exam, now)?;

        let enrolled = self
            .store()
            .find_enrollment(&exam.class_id, student_id)
            .await?
            .is_some_and(|enrollment| enrollment.status == EnrollmentStatus::Active);
        if !enrolled {
            return Err(LifecycleError::Forbidden(format!(
                "student {student_id} is not enrolled in class {}",
                exam.class_id
            )));
        }

        let mine = AttemptFilter::for_student(exam_id, student_id);
        let prior = i32::try_from(self.store().count_attempts(&mine).await?).unwrap_or(i32::MAX);
        if prior >= exam.max_attempts {
            return Err(LifecycleError::LimitReached(format!(
                "maximum attempts ({}) reached for exam {exam_id}",
                exam.max_attempts
            )));
        }

        let open = mine.with_status(AttemptStatus::InProgress);
        if let Some(active) = self.store().find_attempt_by(&open).await? {
            self.expire_if_overdue(&exam, &active.id).await?;
            if let Some(active) = self.store().find_attempt_by(&open).await? {
                return Err(LifecycleError::Conflict(format!(
                    "attempt {} is already in progress for exam {exam_id}",
                    active.id
                )));
            }
        }

        let eligibility = Eligibility {
            attempt_number: prior + 1,
            attempts_remaining: exam.max_attempts - prior - 1,
        };
        Ok((exam, eligibility))
    }
}

fn ensure_window_open(exam: &Exam, now: OffsetDateTime) -> LifecycleResult<()> {
    if exam.status != ExamStatus::Live {
        return Err(LifecycleError::InvalidState(format!(
            "exam {} is not live (status: {})",
            exam.id, exam.status
        )));
    }
    if exam.start_time.is_some_and(|start| now < start) {
        return Err(LifecycleError::InvalidState(format!(
            "exam {} has not started yet",
            exam.id
        )));
    }
    if exam.end_time.is_some_and(|end| now > end) {
        return Err(LifecycleError::InvalidState(format!("exam {} has ended", exam.id)));
    }
    Ok(())
}
