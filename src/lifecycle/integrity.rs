use time::OffsetDateTime;

use super::{ExamEngine, LifecycleError, LifecycleResult};
use crate::db::models::{Attempt, Exam};
use crate::db::types::{AttemptStatus, ExamStatus, SubmissionReason, ViolationType};
use crate::services::attempt_timing::is_overdue;

fn ensure_in_progress(attempt: &Attempt, action: &str) -> LifecycleResult<()> {
    if attempt.status != AttemptStatus::InProgress {
        return Err(LifecycleError::InvalidState(format!(
            "cannot {action} attempt {} (status: {})",
            attempt.id, attempt.status
        )));
    }
    Ok(())
}

fn tab_limit_exceeded(exam: &Exam, attempt: &Attempt) -> bool {
    exam.settings.tab_switch_limit.is_some_and(|limit| attempt.integrity.tab_switches > limit)
}

impl ExamEngine {
    /// Logs one proctoring signal. Timeout is checked lazily here as well as on heartbeat.
    pub(crate) async fn record_violation(
        &self,
        attempt_id: &str,
        violation_type: &str,
    ) -> LifecycleResult<Attempt> {
        let kind = violation_type
            .parse::<ViolationType>()
            .map_err(|err| LifecycleError::Validation(err.to_string()))?;

        let _guard = self.locks().attempt(attempt_id).await;
        let mut attempt = self.load_attempt(attempt_id).await?;
        ensure_in_progress(&attempt, "record violations on")?;
        let exam = self.load_exam(&attempt.exam_id).await?;
        if exam.status != ExamStatus::Live {
            return Err(LifecycleError::InvalidState(format!(
                "exam {} is not live (status: {})",
                exam.id, exam.status
            )));
        }

        let now = self.now();
        attempt.integrity.record(kind, now);
        attempt.updated_at = now;

        metrics::counter!("integrity_violations_total", "type" => kind.as_str()).increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %exam.id,
            student_id = %attempt.student_id,
            violation = kind.as_str(),
            total = attempt.integrity.violations.len(),
            action = "violation_recorded",
            "Integrity violation recorded"
        );

        if is_overdue(&exam, &attempt, now) {
            self.finalize_submission(&mut attempt, SubmissionReason::Timeout, now).await?;
        } else if kind == ViolationType::TabSwitch && tab_limit_exceeded(&exam, &attempt) {
            self.finalize_submission(&mut attempt, SubmissionReason::ViolationLimit, now).await?;
        } else {
            self.store().save_attempt(&attempt).await?;
        }
        Ok(attempt)
    }

    /// Liveness ping. The sole in-request timeout check: an overdue attempt is submitted here.
    pub(crate) async fn heartbeat(&self, attempt_id: &str) -> LifecycleResult<Attempt> {
        let _guard = self.locks().attempt(attempt_id).await;
        let mut attempt = self.load_attempt(attempt_id).await?;
        ensure_in_progress(&attempt, "heartbeat")?;
        let exam = self.load_exam(&attempt.exam_id).await?;

        let now = self.now();
        attempt.integrity.touch(now);
        attempt.updated_at = now;
        if !self.enforce_deadline(&exam, &mut attempt, now).await? {
            self.store().save_attempt(&attempt).await?;
        }
        Ok(attempt)
    }

    /// Takes the attempt lock and submits the attempt if its time is up.
    /// Used where the caller only has an attempt id: admission and the sweep.
    pub(super) async fn expire_if_overdue(
        &self,
        exam: &Exam,
        attempt_id: &str,
    ) -> LifecycleResult<bool> {
        let _guard = self.locks().attempt(attempt_id).await;
        let mut attempt = self.load_attempt(attempt_id).await?;
        self.enforce_deadline(exam, &mut attempt, self.now()).await
    }

    /// Submits `attempt` with reason `timeout` once its duration has elapsed.
    /// Every timeout path ends here. Caller holds the attempt lock.
    pub(super) async fn enforce_deadline(
        &self,
        exam: &Exam,
        attempt: &mut Attempt,
        now: OffsetDateTime,
    ) -> LifecycleResult<bool> {
        if attempt.status != AttemptStatus::InProgress || !is_overdue(exam, attempt, now) {
            return Ok(false);
        }
        self.finalize_submission(attempt, SubmissionReason::Timeout, now).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::Clock;
    use crate::store::Store;
    use crate::test_support::{Harness, STUDENT};
    use time::Duration;

    #[tokio::test]
    async fn counters_and_log_follow_call_order() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        for kind in ["tab_switch", "copy", "copy", "paste"] {
            h.clock.advance(Duration::seconds(1));
            h.engine.record_violation(&attempt.id, kind).await.expect("record");
        }

        let stored = h.store.find_attempt(&attempt.id).await.expect("find").expect("attempt");
        let integrity = &stored.integrity;
        assert_eq!(integrity.tab_switches, 1);
        assert_eq!(integrity.copy_events, 2);
        assert_eq!(integrity.paste_events, 1);
        assert_eq!(integrity.focus_lost_count, 0);
        let kinds: Vec<ViolationType> =
            integrity.violations.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationType::TabSwitch,
                ViolationType::Copy,
                ViolationType::Copy,
                ViolationType::Paste
            ]
        );
        assert!(integrity.violations.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(integrity.last_active_at, h.clock.now());
        assert_eq!(stored.status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn n_copy_events_yield_n_entries() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        for _ in 0..7 {
            h.engine.record_violation(&attempt.id, "copy").await.expect("record");
        }
        let stored = h.store.find_attempt(&attempt.id).await.expect("find").expect("attempt");
        assert_eq!(stored.integrity.copy_events, 7);
        assert_eq!(stored.integrity.violations.len(), 7);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected_without_change() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let err = h.engine.record_violation(&attempt.id, "screenshot").await.expect_err("unknown");
        assert!(matches!(err, LifecycleError::Validation(_)));
        let stored = h.store.find_attempt(&attempt.id).await.expect("find").expect("attempt");
        assert!(stored.integrity.violations.is_empty());
    }

    #[tokio::test]
    async fn violations_rejected_once_exam_closed() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");
        let mut exam = h.store.find_exam("exam-1").await.expect("find").expect("exam");
        exam.status = ExamStatus::Closed;
        h.store.save_exam(&exam).await.expect("save");

        let err = h.engine.record_violation(&attempt.id, "copy").await.expect_err("closed");
        assert!(matches!(err, LifecycleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn heartbeat_after_duration_auto_submits() {
        let h = Harness::new();
        let mut exam = h.live_exam("exam-1").await;
        exam.duration_minutes = 1;
        h.store.save_exam(&exam).await.expect("save");
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        h.clock.advance(Duration::seconds(30));
        let alive = h.engine.heartbeat(&attempt.id).await.expect("heartbeat");
        assert_eq!(alive.status, AttemptStatus::InProgress);
        assert_eq!(alive.integrity.last_active_at, h.clock.now());

        h.clock.advance(Duration::seconds(90));
        let done = h.engine.heartbeat(&attempt.id).await.expect("late heartbeat");
        assert_eq!(done.status, AttemptStatus::Submitted);
        assert!(done.integrity.auto_submitted);
        assert_eq!(done.submission_reason, Some(SubmissionReason::Timeout));
        assert_eq!(done.submitted_at, Some(h.clock.now()));

        let err = h.engine.heartbeat(&attempt.id).await.expect_err("already submitted");
        assert!(matches!(err, LifecycleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn heartbeat_exactly_at_deadline_submits() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        h.clock.advance(Duration::minutes(60));
        let done = h.engine.heartbeat(&attempt.id).await.expect("heartbeat");
        assert_eq!(done.status, AttemptStatus::Submitted);
        assert!(done.integrity.auto_submitted);
    }

    #[tokio::test]
    async fn overdue_violation_submits_with_timeout() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        h.clock.advance(Duration::minutes(61));
        let done = h.engine.record_violation(&attempt.id, "focus_lost").await.expect("record");
        assert_eq!(done.status, AttemptStatus::Submitted);
        assert!(done.integrity.auto_submitted);
        assert_eq!(done.integrity.focus_lost_count, 1);
    }

    #[tokio::test]
    async fn tab_switch_limit_forces_submission() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        for _ in 0..3 {
            let current = h.engine.record_violation(&attempt.id, "tab_switch").await.expect("record");
            assert_eq!(current.status, AttemptStatus::InProgress);
        }
        let done = h.engine.record_violation(&attempt.id, "tab_switch").await.expect("fourth");
        assert_eq!(done.status, AttemptStatus::Submitted);
        assert_eq!(done.submission_reason, Some(SubmissionReason::ViolationLimit));
        assert!(!done.integrity.auto_submitted);
        assert_eq!(done.integrity.tab_switches, 4);
    }

    #[tokio::test]
    async fn concurrent_violations_are_all_counted() {
        let h = Harness::new();
        let mut exam = h.live_exam("exam-1").await;
        exam.settings.tab_switch_limit = None;
        h.store.save_exam(&exam).await.expect("save");
        let attempt = h.engine.start_attempt("exam-1", STUDENT).await.expect("start");

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = h.engine.clone();
            let id = attempt.id.clone();
            handles.push(tokio::spawn(async move { engine.record_violation(&id, "paste").await }));
        }
        for handle in handles {
            handle.await.expect("join").expect("record");
        }

        let stored = h.store.find_attempt(&attempt.id).await.expect("find").expect("attempt");
        assert_eq!(stored.integrity.paste_events, 20);
        assert_eq!(stored.integrity.violations.len(), 20);
    }
}
