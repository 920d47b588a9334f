use time::OffsetDateTime;

use super::exam_machine::ensure_owner;
use super::transitions::ensure_transition;
use super::{ExamEngine, LifecycleError, LifecycleResult};
use crate::db::models::{Attempt, Exam};
use crate::db::types::{AttemptStatus, ExamStatus, SubmissionReason};
use crate::store::AttemptFilter;

impl ExamEngine {
    /// Explicit submission by the student (or on their behalf when `student_id` is `None`).
    pub(crate) async fn submit(
        &self,
        attempt_id: &str,
        student_id: Option<&str>,
        answer_artifact: Option<String>,
    ) -> LifecycleResult<Attempt> {
        let _guard = self.locks().attempt(attempt_id).await;
        let mut attempt = self.load_attempt(attempt_id).await?;
        if let Some(student_id) = student_id {
            if attempt.student_id != student_id {
                return Err(LifecycleError::Forbidden(format!(
                    "attempt {attempt_id} belongs to another student"
                )));
            }
        }
        ensure_transition(attempt.status, AttemptStatus::Submitted)?;

        let exam = self.load_exam(&attempt.exam_id).await?;
        if !matches!(exam.status, ExamStatus::Live | ExamStatus::Closed) {
            return Err(LifecycleError::InvalidState(format!(
                "exam {} no longer accepts submissions (status: {})",
                exam.id, exam.status
            )));
        }

        if let Some(artifact) = answer_artifact {
            if !exam.settings.allow_pdf_upload {
                return Err(LifecycleError::Validation(format!(
                    "exam {} does not accept uploaded answer sheets",
                    exam.id
                )));
            }
            attempt.answer_artifact = Some(artifact);
        }

        self.finalize_submission(&mut attempt, SubmissionReason::Manual, self.now()).await?;
        Ok(attempt)
    }

    /// Moves an in-progress attempt to `submitted`. Caller holds the attempt lock.
    pub(super) async fn finalize_submission(
        &self,
        attempt: &mut Attempt,
        reason: SubmissionReason,
        now: OffsetDateTime,
    ) -> LifecycleResult<()> {
        ensure_transition(attempt.status, AttemptStatus::Submitted)?;

        let mut next = attempt.clone();
        next.status = AttemptStatus::Submitted;
        next.submitted_at = Some(now);
        next.submission_reason = Some(reason);
        next.integrity.auto_submitted = reason == SubmissionReason::Timeout;
        next.updated_at = now;
        self.store().save_attempt(&next).await?;
        *attempt = next;

        if reason == SubmissionReason::Manual {
            tracing::info!(
                attempt_id = %attempt.id,
                exam_id = %attempt.exam_id,
                student_id = %attempt.student_id,
                action = "attempt_submit",
                "Attempt submitted"
            );
        } else {
            metrics::counter!("attempts_auto_submitted_total", "reason" => reason.as_str())
                .increment(1);
            tracing::info!(
                attempt_id = %attempt.id,
                exam_id = %attempt.exam_id,
                student_id = %attempt.student_id,
                reason = reason.as_str(),
                action = "attempt_auto_submit",
                "Attempt auto-submitted"
            );
        }
        Ok(())
    }

    /// Submits every in-progress attempt of `exam`. Caller holds the exam lock.
    pub(super) async fn submit_open_attempts(
        &self,
        exam: &Exam,
        reason: SubmissionReason,
    ) -> LifecycleResult<usize> {
        let open = AttemptFilter::for_exam(&exam.id).with_status(AttemptStatus::InProgress);
        let mut submitted = 0;
        for candidate in self.store().list_attempts(&open).await? {
            let _guard = self.locks().attempt(&candidate.id).await;
            let result = async {
                let mut attempt = self.load_attempt(&candidate.id).await?;
                if attempt.status != AttemptStatus::InProgress {
                    return Ok(false);
                }
                self.finalize_submission(&mut attempt, reason, self.now()).await?;
                Ok::<_, LifecycleError>(true)
            }
            .await;
            match result {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                // The sweep retries attempts left open on a closed exam.
                Err(err) => tracing::warn!(
                    exam_id = %exam.id,
                    attempt_id = %candidate.id,
                    error = %err,
                    "Failed to submit open attempt"
                ),
            }
        }
        Ok(submitted)
    }

    pub(crate) async fn record_manual_score(
        &self,
        attempt_id: &str,
        actor_id: &str,
        score: f64,
        feedback: Option<String>,
    ) -> LifecycleResult<Attempt> {
        let _guard = self.locks().attempt(attempt_id).await;
        let mut attempt = self.load_attempt(attempt_id).await?;
        let exam = self.load_exam(&attempt.exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        ensure_transition(attempt.status, AttemptStatus::Evaluated)?;
        ensure_score_in_range(&exam, score)?;

        self.record_score(&mut attempt, score, feedback).await?;
        tracing::info!(
            teacher_id = %actor_id,
            attempt_id = %attempt.id,
            exam_id = %exam.id,
            score,
            action = "attempt_score_manual",
            "Attempt scored"
        );
        Ok(attempt)
    }

    /// Moves a submitted attempt to `evaluated`. Caller holds the attempt lock.
    pub(super) async fn record_score(
        &self,
        attempt: &mut Attempt,
        score: f64,
        feedback: Option<String>,
    ) -> LifecycleResult<()> {
        ensure_transition(attempt.status, AttemptStatus::Evaluated)?;
        let now = self.now();

        let mut next = attempt.clone();
        next.status = AttemptStatus::Evaluated;
        next.score = Some(score);
        next.feedback = feedback;
        next.evaluated_at = Some(now);
        next.updated_at = now;
        self.store().save_attempt(&next).await?;
        *attempt = next;
        Ok(())
    }

    pub(crate) async fn list_attempts(
        &self,
        exam_id: &str,
        actor_id: &str,
    ) -> LifecycleResult<Vec<Attempt>> {
        let exam = self.load_exam(exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        Ok(self.store().list_attempts(&AttemptFilter::for_exam(exam_id)).await?)
    }

    /// The student who owns the attempt and the exam owner may read it.
    pub(crate) async fn view_attempt(
        &self,
        attempt_id: &str,
        actor_id: &str,
    ) -> LifecycleResult<(Exam, Attempt)> {
        let attempt = self.load_attempt(attempt_id).await?;
        let exam = self.load_exam(&attempt.exam_id).await?;
        if attempt.student_id != actor_id && exam.created_by != actor_id {
            return Err(LifecycleError::Forbidden(format!(
                "user {actor_id} cannot view attempt {attempt_id}"
            )));
        }
        Ok((exam, attempt))
    }
}

pub(super) fn ensure_score_in_range(exam: &Exam, score: f64) -> LifecycleResult<()> {
    if !score.is_finite() || score < 0.0 || score > f64::from(exam.total_marks) {
        return Err(LifecycleError::Validation(format!(
            "score {score} is outside 0..={} for exam {}",
            exam.total_marks, exam.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::test_support::{Harness, OTHER_TEACHER, STUDENT, STUDENT_2, TEACHER};

    #[tokio::test]
    async fn explicit_submit_is_manual_and_not_auto() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let submitted = h
            .engine
            .submit(&attempt.id, Some(STUDENT), Some("sheets/a.pdf".to_string()))
            .await
            .expect("submit");
        assert_eq!(submitted.status, AttemptStatus::Submitted);
        assert_eq!(submitted.submission_reason, Some(SubmissionReason::Manual));
        assert!(!submitted.integrity.auto_submitted);
        assert_eq!(submitted.answer_artifact.as_deref(), Some("sheets/a.pdf"));
        assert!(submitted.submitted_at.is_some());
    }

    #[tokio::test]
    async fn second_submit_names_the_disallowed_pair() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");
        h.engine.submit(&attempt.id, None, None).await.expect("submit");

        let err = h.engine.submit(&attempt.id, None, None).await.expect_err("twice");
        assert!(err.to_string().contains("submitted→submitted"), "{err}");
    }

    #[tokio::test]
    async fn submit_checks_ownership() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let err = h.engine.submit(&attempt.id, Some(STUDENT_2), None).await.expect_err("foreign");
        assert!(matches!(err, LifecycleError::Forbidden(_)));
        let stored = h.store.find_attempt(&attempt.id).await.expect("find").expect("attempt");
        assert_eq!(stored.status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn upload_requires_permission() {
        let h = Harness::new();
        let mut exam = h.live_exam("exam-1").await;
        exam.settings.allow_pdf_upload = false;
        h.store.save_exam(&exam).await.expect("save");
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let err = h
            .engine
            .submit(&attempt.id, Some(STUDENT), Some("sheet.pdf".to_string()))
            .await
            .expect_err("uploads off");
        assert!(matches!(err, LifecycleError::Validation(_)));
        h.engine.submit(&attempt.id, Some(STUDENT), None).await.expect("plain submit");
    }

    #[tokio::test]
    async fn submit_after_close_allowed_but_not_after_evaluation_starts() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let mut exam = h.store.find_exam("exam-1").await.expect("find").expect("exam");
        exam.status = ExamStatus::Closed;
        h.store.save_exam(&exam).await.expect("save");
        h.engine.submit(&attempt.id, Some(STUDENT), None).await.expect("overdue submit");

        let mut second = h.store.find_attempt(&attempt.id).await.expect("find").expect("attempt");
        second.id = "attempt-late".to_string();
        second.attempt_number = 2;
        second.status = AttemptStatus::InProgress;
        h.store.create_attempt(&second).await.expect("insert");
        exam.status = ExamStatus::Evaluating;
        h.store.save_exam(&exam).await.expect("save");

        let err = h.engine.submit("attempt-late", None, None).await.expect_err("evaluating");
        assert!(matches!(err, LifecycleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn manual_score_is_owner_gated_and_bounded() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let err = h
            .engine
            .record_manual_score(&attempt.id, TEACHER, 10.0, None)
            .await
            .expect_err("still in progress");
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

        h.engine.submit(&attempt.id, Some(STUDENT), None).await.expect("submit");
        let err = h
            .engine
            .record_manual_score(&attempt.id, OTHER_TEACHER, 10.0, None)
            .await
            .expect_err("not owner");
        assert!(matches!(err, LifecycleError::Unauthorized(_)));

        let err = h
            .engine
            .record_manual_score(&attempt.id, TEACHER, 100.5, None)
            .await
            .expect_err("above total");
        assert!(matches!(err, LifecycleError::Validation(_)));

        let scored = h
            .engine
            .record_manual_score(&attempt.id, TEACHER, 87.5, Some("well done".into()))
            .await
            .expect("score");
        assert_eq!(scored.status, AttemptStatus::Evaluated);
        assert_eq!(scored.score, Some(87.5));
        assert!(scored.evaluated_at.is_some());
    }

    #[tokio::test]
    async fn attempts_are_visible_to_owner_and_student_only() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        assert!(h.engine.view_attempt(&attempt.id, STUDENT).await.is_ok());
        assert!(h.engine.view_attempt(&attempt.id, TEACHER).await.is_ok());
        let err = h.engine.view_attempt(&attempt.id, STUDENT_2).await.expect_err("peer");
        assert!(matches!(err, LifecycleError::Forbidden(_)));

        let listed = h.engine.list_attempts("exam-1", TEACHER).await.expect("list");
        assert_eq!(listed.len(), 1);
        let err = h.engine.list_attempts("exam-1", STUDENT).await.expect_err("student list");
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
    }
}
