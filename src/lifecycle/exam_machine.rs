use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::evaluation::EVALUATION_JOB;
use super::transitions::ensure_transition;
use super::{ExamEngine, LifecycleError, LifecycleResult};
use crate::db::models::{Exam, ExamSettings};
use crate::db::types::{EnrollmentStatus, EvaluationMode, ExamStatus, SubmissionReason, UserRole};
use crate::services::notifications::{ExamEvent, ExamEventKind};

pub(crate) const DEFAULT_DURATION_MINUTES: i32 = 60;
pub(crate) const DEFAULT_MAX_ATTEMPTS: i32 = 1;
pub(crate) const DEFAULT_TOTAL_MARKS: i32 = 100;

#[derive(Debug, Clone)]
pub(crate) struct NewExam {
    pub(crate) class_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: i32,
    pub(crate) max_attempts: i32,
    pub(crate) evaluation_mode: EvaluationMode,
    pub(crate) start_time: Option<OffsetDateTime>,
    pub(crate) end_time: Option<OffsetDateTime>,
    pub(crate) settings: ExamSettings,
}

impl NewExam {
    pub(crate) fn new(class_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            title: title.into(),
            description: String::new(),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            total_marks: DEFAULT_TOTAL_MARKS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            evaluation_mode: EvaluationMode::Manual,
            start_time: None,
            end_time: None,
            settings: ExamSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ExamChanges {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) total_marks: Option<i32>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) evaluation_mode: Option<EvaluationMode>,
    pub(crate) start_time: Option<OffsetDateTime>,
    pub(crate) end_time: Option<OffsetDateTime>,
    pub(crate) settings: Option<ExamSettings>,
}

fn validate_fields(exam: &Exam) -> LifecycleResult<()> {
    if exam.title.trim().is_empty() {
        return Err(LifecycleError::Validation("title must not be empty".to_string()));
    }
    if exam.duration_minutes < 1 {
        return Err(LifecycleError::Validation("duration_minutes must be at least 1".to_string()));
    }
    if exam.max_attempts < 1 {
        return Err(LifecycleError::Validation("max_attempts must be at least 1".to_string()));
    }
    if exam.total_marks < 0 {
        return Err(LifecycleError::Validation("total_marks must be non-negative".to_string()));
    }
    if let (Some(start), Some(end)) = (exam.start_time, exam.end_time) {
        if start >= end {
            return Err(LifecycleError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_publishable(exam: &Exam) -> LifecycleResult<()> {
    if exam.title.trim().is_empty() {
        return Err(LifecycleError::Validation("title must not be empty".to_string()));
    }
    match (exam.start_time, exam.end_time) {
        (Some(start), Some(end)) if start < end => Ok(()),
        (Some(_), Some(_)) => {
            Err(LifecycleError::Validation("start_time must be before end_time".to_string()))
        }
        _ => Err(LifecycleError::Validation(
            "start_time and end_time are required to publish".to_string(),
        )),
    }
}

pub(super) fn ensure_owner(exam: &Exam, actor_id: &str) -> LifecycleResult<()> {
    if exam.created_by != actor_id {
        return Err(LifecycleError::Unauthorized(format!(
            "user {actor_id} does not own exam {}",
            exam.id
        )));
    }
    Ok(())
}

fn ensure_draft(exam: &Exam, action: &str) -> LifecycleResult<()> {
    if exam.status != ExamStatus::Draft {
        return Err(LifecycleError::InvalidState(format!(
            "exam {} can only be {action} while draft (status: {})",
            exam.id, exam.status
        )));
    }
    Ok(())
}

fn event_kind(status: ExamStatus) -> Option<ExamEventKind> {
    match status {
        ExamStatus::Draft => None,
        ExamStatus::Published => Some(ExamEventKind::Published),
        ExamStatus::Live => Some(ExamEventKind::Started),
        ExamStatus::Closed => Some(ExamEventKind::Closed),
        ExamStatus::Evaluating => Some(ExamEventKind::EvaluationStarted),
        ExamStatus::ResultPublished => Some(ExamEventKind::ResultsPublished),
    }
}

fn action_name(status: ExamStatus) -> &'static str {
    match status {
        ExamStatus::Draft => "exam_create",
        ExamStatus::Published => "exam_publish",
        ExamStatus::Live => "exam_start",
        ExamStatus::Closed => "exam_close",
        ExamStatus::Evaluating => "exam_start_evaluation",
        ExamStatus::ResultPublished => "exam_publish_results",
    }
}

impl ExamEngine {
    pub(crate) async fn create_exam(&self, actor_id: &str, new: NewExam) -> LifecycleResult<Exam> {
        let user = self
            .store()
            .find_user(actor_id)
            .await?
            .ok_or_else(|| LifecycleError::user_not_found(actor_id))?;
        if user.role != UserRole::Teacher || !user.is_active {
            return Err(LifecycleError::Forbidden("only active teachers can create exams".into()));
        }

        let class = self.store().find_class(&new.class_id).await?.ok_or_else(|| {
            LifecycleError::NotFound { entity: "class", id: new.class_id.clone() }
        })?;
        if class.teacher_id != actor_id {
            return Err(LifecycleError::Forbidden(format!(
                "user {actor_id} does not teach class {}",
                class.id
            )));
        }

        let now = self.now();
        let exam = Exam {
            id: Uuid::new_v4().to_string(),
            class_id: class.id,
            created_by: actor_id.to_string(),
            title: new.title.trim().to_string(),
            description: new.description,
            duration_minutes: new.duration_minutes,
            total_marks: new.total_marks,
            max_attempts: new.max_attempts,
            evaluation_mode: new.evaluation_mode,
            start_time: new.start_time,
            end_time: new.end_time,
            status: ExamStatus::Draft,
            settings: Json(new.settings),
            created_at: now,
            updated_at: now,
            published_at: None,
            started_at: None,
            closed_at: None,
            evaluation_started_at: None,
            results_published_at: None,
            papers: Json(Vec::new()),
            papers_generated_at: None,
        };
        validate_fields(&exam)?;
        self.store().create_exam(&exam).await?;

        tracing::info!(
            teacher_id = %actor_id,
            exam_id = %exam.id,
            class_id = %exam.class_id,
            action = "exam_create",
            "Exam created"
        );
        Ok(exam)
    }

    pub(crate) async fn update_exam(
        &self,
        exam_id: &str,
        actor_id: &str,
        changes: ExamChanges,
    ) -> LifecycleResult<Exam> {
        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        ensure_draft(&exam, "edited")?;

        if let Some(title) = changes.title {
            exam.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            exam.description = description;
        }
        if let Some(duration) = changes.duration_minutes {
            exam.duration_minutes = duration;
        }
        if let Some(total_marks) = changes.total_marks {
            exam.total_marks = total_marks;
        }
        if let Some(max_attempts) = changes.max_attempts {
            exam.max_attempts = max_attempts;
        }
        if let Some(mode) = changes.evaluation_mode {
            exam.evaluation_mode = mode;
        }
        if let Some(start) = changes.start_time {
            exam.start_time = Some(start);
        }
        if let Some(end) = changes.end_time {
            exam.end_time = Some(end);
        }
        if let Some(settings) = changes.settings {
            exam.settings = Json(settings);
        }
        validate_fields(&exam)?;

        exam.updated_at = self.now();
        self.store().save_exam(&exam).await?;

        tracing::info!(teacher_id = %actor_id, exam_id = %exam.id, action = "exam_update", "Exam updated");
        Ok(exam)
    }

    pub(crate) async fn delete_exam(&self, exam_id: &str, actor_id: &str) -> LifecycleResult<()> {
        let _guard = self.locks().exam(exam_id).await;
        let exam = self.load_exam(exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        ensure_draft(&exam, "deleted")?;

        if !self.store().delete_exam(exam_id).await? {
            return Err(LifecycleError::exam_not_found(exam_id));
        }

        tracing::info!(teacher_id = %actor_id, exam_id = %exam_id, action = "exam_delete", "Exam deleted");
        Ok(())
    }

    /// Owners see their exams in any state; enrolled students see them once published.
    pub(crate) async fn view_exam(&self, exam_id: &str, actor_id: &str) -> LifecycleResult<Exam> {
        let exam = self.load_exam(exam_id).await?;
        if exam.created_by == actor_id {
            return Ok(exam);
        }
        let enrolled = self
            .store()
            .find_enrollment(&exam.class_id, actor_id)
            .await?
            .is_some_and(|enrollment| enrollment.status == EnrollmentStatus::Active);
        if enrolled && exam.status != ExamStatus::Draft {
            return Ok(exam);
        }
        Err(LifecycleError::Forbidden(format!("user {actor_id} cannot view exam {exam_id}")))
    }

    pub(crate) async fn publish(&self, exam_id: &str, actor_id: &str) -> LifecycleResult<Exam> {
        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        ensure_transition(exam.status, ExamStatus::Published)?;
        validate_publishable(&exam)?;

        self.advance(&mut exam, ExamStatus::Published, Some(actor_id)).await?;
        Ok(exam)
    }

    /// `actor_id` is `None` when the sweep starts the exam on schedule.
    pub(crate) async fn start(&self, exam_id: &str, actor_id: Option<&str>) -> LifecycleResult<Exam> {
        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        if let Some(actor_id) = actor_id {
            ensure_owner(&exam, actor_id)?;
        }
        ensure_transition(exam.status, ExamStatus::Live)?;
        if let Some(starts_at) = exam.start_time {
            if self.now() < starts_at {
                return Err(LifecycleError::TooEarly { exam_id: exam.id.clone(), starts_at });
            }
        }

        self.advance(&mut exam, ExamStatus::Live, actor_id).await?;
        Ok(exam)
    }

    /// Closes a live exam and submits every attempt still in progress.
    pub(crate) async fn close(&self, exam_id: &str, actor_id: Option<&str>) -> LifecycleResult<Exam> {
        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        if let Some(actor_id) = actor_id {
            ensure_owner(&exam, actor_id)?;
        }
        ensure_transition(exam.status, ExamStatus::Closed)?;

        self.advance(&mut exam, ExamStatus::Closed, actor_id).await?;

        let submitted = self.submit_open_attempts(&exam, SubmissionReason::ExamClosed).await?;
        if submitted > 0 {
            tracing::info!(
                exam_id = %exam.id,
                attempts = submitted,
                action = "exam_close_submit_open",
                "Submitted open attempts on close"
            );
        }
        Ok(exam)
    }

    pub(crate) async fn start_evaluation(
        &self,
        exam_id: &str,
        actor_id: &str,
    ) -> LifecycleResult<Exam> {
        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        ensure_transition(exam.status, ExamStatus::Evaluating)?;

        self.advance(&mut exam, ExamStatus::Evaluating, Some(actor_id)).await?;
        Ok(exam)
    }

    pub(crate) async fn publish_results(
        &self,
        exam_id: &str,
        actor_id: &str,
    ) -> LifecycleResult<Exam> {
        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        ensure_owner(&exam, actor_id)?;
        ensure_transition(exam.status, ExamStatus::ResultPublished)?;
        if self.job_running(EVALUATION_JOB, exam_id) {
            return Err(LifecycleError::InvalidState(format!(
                "evaluation of exam {exam_id} is still running"
            )));
        }

        self.advance(&mut exam, ExamStatus::ResultPublished, Some(actor_id)).await?;
        Ok(exam)
    }

    /// The single place an exam changes status. Caller holds the exam lock.
    /// Notification is queued, never awaited.
    pub(super) async fn advance(
        &self,
        exam: &mut Exam,
        to: ExamStatus,
        actor_id: Option<&str>,
    ) -> LifecycleResult<()> {
        ensure_transition(exam.status, to)?;
        let from = exam.status;
        let now = self.now();

        let mut next = exam.clone();
        next.status = to;
        next.updated_at = now;
        match to {
            ExamStatus::Draft => {}
            ExamStatus::Published => next.published_at = Some(now),
            ExamStatus::Live => next.started_at = Some(now),
            ExamStatus::Closed => next.closed_at = Some(now),
            ExamStatus::Evaluating => next.evaluation_started_at = Some(now),
            ExamStatus::ResultPublished => next.results_published_at = Some(now),
        }
        self.store().save_exam(&next).await?;
        *exam = next;

        metrics::counter!("exam_transitions_total", "to" => to.as_str()).increment(1);
        tracing::info!(
            exam_id = %exam.id,
            actor_id = actor_id.unwrap_or("system"),
            from = from.as_str(),
            to = to.as_str(),
            action = action_name(to),
            "Exam status changed"
        );

        if let Some(kind) = event_kind(to) {
            let recipients = self.recipients(exam, kind).await;
            self.emit(ExamEvent {
                kind,
                exam_id: exam.id.clone(),
                exam_title: exam.title.clone(),
                recipients,
                occurred_at: now,
            });
        }
        Ok(())
    }

    async fn recipients(&self, exam: &Exam, kind: ExamEventKind) -> Vec<String> {
        match kind {
            ExamEventKind::Closed | ExamEventKind::EvaluationStarted => vec![exam.created_by.clone()],
            ExamEventKind::Published | ExamEventKind::Started | ExamEventKind::ResultsPublished => {
                match self.store().list_enrollments(&exam.class_id).await {
                    Ok(enrollments) => enrollments
                        .into_iter()
                        .filter(|enrollment| enrollment.status == EnrollmentStatus::Active)
                        .map(|enrollment| enrollment.student_id)
                        .collect(),
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            exam_id = %exam.id,
                            "Failed to resolve notification recipients"
                        );
                        Vec::new()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::clock::Clock;
    use crate::db::types::AttemptStatus;
    use crate::services::notifications::{Notifier, NotifyError};
    use crate::store::Store;
    use crate::test_support::{
        fixtures, Harness, CLASS, OTHER_TEACHER, STUDENT, STUDENT_2, STUDENT_3, TEACHER,
    };
    use time::Duration;

    #[tokio::test]
    async fn full_lifecycle_visits_every_state_once() {
        let h = Harness::new();
        let exam = h.draft_exam("exam-1").await;

        let published = h.engine.publish(&exam.id, TEACHER).await.expect("publish");
        assert_eq!(published.status, ExamStatus::Published);
        assert_eq!(published.published_at, Some(h.clock.now()));

        let live = h.engine.start(&exam.id, None).await.expect("start");
        assert_eq!(live.status, ExamStatus::Live);

        let closed = h.engine.close(&exam.id, Some(TEACHER)).await.expect("close");
        assert_eq!(closed.status, ExamStatus::Closed);
        assert!(closed.closed_at.is_some());

        let evaluating = h.engine.start_evaluation(&exam.id, TEACHER).await.expect("evaluate");
        assert_eq!(evaluating.status, ExamStatus::Evaluating);

        let done = h.engine.publish_results(&exam.id, TEACHER).await.expect("results");
        assert_eq!(done.status, ExamStatus::ResultPublished);
        assert!(done.results_published_at.is_some());

        h.engine.flush_notifications().await;
        assert_eq!(
            h.notifier.kinds(),
            vec![
                ExamEventKind::Published,
                ExamEventKind::Started,
                ExamEventKind::Closed,
                ExamEventKind::EvaluationStarted,
                ExamEventKind::ResultsPublished,
            ]
        );
    }

    #[tokio::test]
    async fn publish_checks_owner_before_state_and_fields() {
        let h = Harness::new();
        let mut exam = fixtures::exam("exam-1", CLASS, TEACHER);
        exam.end_time = None;
        h.store.create_exam(&exam).await.expect("insert");

        let err = h.engine.publish("exam-1", OTHER_TEACHER).await.expect_err("not owner");
        assert!(matches!(err, LifecycleError::Unauthorized(_)));

        let err = h.engine.publish("exam-1", TEACHER).await.expect_err("missing end");
        assert!(matches!(err, LifecycleError::Validation(_)));

        let err = h.engine.publish("missing", TEACHER).await.expect_err("missing exam");
        assert!(matches!(err, LifecycleError::NotFound { entity: "exam", .. }));
    }

    #[tokio::test]
    async fn publish_rejects_inverted_window_and_leaves_draft() {
        let h = Harness::new();
        let mut exam = fixtures::exam("exam-1", CLASS, TEACHER);
        exam.end_time = exam.start_time.map(|start| start - Duration::hours(1));
        h.store.create_exam(&exam).await.expect("insert");

        let err = h.engine.publish("exam-1", TEACHER).await.expect_err("inverted");
        assert!(matches!(err, LifecycleError::Validation(_)));

        let stored = h.store.find_exam("exam-1").await.expect("find").expect("exam");
        assert_eq!(stored.status, ExamStatus::Draft);
        assert!(stored.published_at.is_none());
        h.engine.flush_notifications().await;
        assert!(h.notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn publish_twice_is_invalid_transition() {
        let h = Harness::new();
        h.exam_in("exam-1", ExamStatus::Published).await;

        let err = h.engine.publish("exam-1", TEACHER).await.expect_err("already published");
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition { from: "published", to: "published", .. }
        ));
    }

    #[tokio::test]
    async fn start_before_window_is_too_early() {
        let h = Harness::new();
        let mut exam = h.exam_in("exam-1", ExamStatus::Published).await;
        exam.start_time = Some(h.clock.now() + Duration::minutes(5));
        h.store.save_exam(&exam).await.expect("save");

        let err = h.engine.start("exam-1", None).await.expect_err("too early");
        assert!(matches!(err, LifecycleError::TooEarly { .. }));

        h.clock.advance(Duration::minutes(5));
        let live = h.engine.start("exam-1", None).await.expect("start on time");
        assert_eq!(live.status, ExamStatus::Live);
    }

    #[tokio::test]
    async fn close_from_published_names_the_pair() {
        let h = Harness::new();
        h.exam_in("exam-1", ExamStatus::Published).await;

        let err = h.engine.close("exam-1", None).await.expect_err("not live");
        assert!(err.to_string().contains("published→closed"), "{err}");
    }

    #[tokio::test]
    async fn close_submits_open_attempts_as_exam_closed() {
        let h = Harness::new();
        h.live_exam("exam-1").await;
        let open = h.engine.start_attempt("exam-1", STUDENT).await.expect("attempt");
        let other = h.engine.start_attempt("exam-1", STUDENT_2).await.expect("attempt");
        h.engine.submit(&other.id, Some(STUDENT_2), None).await.expect("submit");

        h.engine.close("exam-1", None).await.expect("system close");

        let closed = h.store.find_attempt(&open.id).await.expect("find").expect("attempt");
        assert_eq!(closed.status, AttemptStatus::Submitted);
        assert_eq!(closed.submission_reason, Some(SubmissionReason::ExamClosed));
        assert!(!closed.integrity.auto_submitted);

        let untouched = h.store.find_attempt(&other.id).await.expect("find").expect("attempt");
        assert_eq!(untouched.submission_reason, Some(SubmissionReason::Manual));
    }

    #[tokio::test]
    async fn notifier_failure_does_not_undo_transition() {
        let h = Harness::new();
        h.draft_exam("exam-1").await;
        h.notifier.set_failing(true);

        let exam = h.engine.publish("exam-1", TEACHER).await.expect("publish despite notifier");
        assert_eq!(exam.status, ExamStatus::Published);
        let stored = h.store.find_exam("exam-1").await.expect("find").expect("exam");
        assert_eq!(stored.status, ExamStatus::Published);

        h.engine.flush_notifications().await;
        assert!(h.notifier.events().is_empty());
    }

    /// Accepts events and never finishes delivering them.
    struct StalledNotifier;

    #[async_trait::async_trait]
    impl Notifier for StalledNotifier {
        async fn notify(&self, _event: &ExamEvent) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_notifier_never_holds_up_transitions() {
        let h = Harness::new();
        h.draft_exam("exam-1").await;
        let engine = ExamEngine::new(
            h.store.clone(),
            h.clock.clone(),
            h.grader.clone(),
            h.papers.clone(),
            Arc::new(StalledNotifier),
        );

        let run = async {
            engine.publish("exam-1", TEACHER).await.expect("publish");
            engine.start("exam-1", None).await.expect("start");
            engine.close("exam-1", Some(TEACHER)).await.expect("close")
        };
        let closed = tokio::time::timeout(std::time::Duration::from_secs(1), run)
            .await
            .expect("transitions finish without waiting on delivery");
        assert_eq!(closed.status, ExamStatus::Closed);
    }

    #[tokio::test]
    async fn published_event_targets_active_students_and_closed_targets_owner() {
        let h = Harness::new();
        h.draft_exam("exam-1").await;
        h.engine.publish("exam-1", TEACHER).await.expect("publish");
        h.engine.start("exam-1", None).await.expect("start");
        h.engine.close("exam-1", None).await.expect("close");
        h.engine.flush_notifications().await;

        let events = h.notifier.events();
        let mut published_to = events[0].recipients.clone();
        published_to.sort();
        assert_eq!(
            published_to,
            vec![STUDENT.to_string(), STUDENT_2.to_string(), STUDENT_3.to_string()]
        );
        assert_eq!(events[2].recipients, vec![TEACHER.to_string()]);
    }

    #[tokio::test]
    async fn create_exam_applies_defaults_and_requires_class_owner() {
        let h = Harness::new();
        let exam =
            h.engine.create_exam(TEACHER, NewExam::new(CLASS, "  Midterm ")).await.expect("create");
        assert_eq!(exam.status, ExamStatus::Draft);
        assert_eq!(exam.title, "Midterm");
        assert_eq!(exam.duration_minutes, 60);
        assert_eq!(exam.max_attempts, 1);
        assert_eq!(exam.total_marks, 100);
        assert_eq!(exam.evaluation_mode, EvaluationMode::Manual);
        assert_eq!(exam.settings.tab_switch_limit, Some(3));

        let err = h
            .engine
            .create_exam(OTHER_TEACHER, NewExam::new(CLASS, "Quiz"))
            .await
            .expect_err("foreign class");
        assert!(matches!(err, LifecycleError::Forbidden(_)));

        let err = h
            .engine
            .create_exam(STUDENT, NewExam::new(CLASS, "Quiz"))
            .await
            .expect_err("student");
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[tokio::test]
    async fn create_exam_validates_fields() {
        let h = Harness::new();
        let mut new = NewExam::new(CLASS, "Quiz");
        new.max_attempts = 0;
        let err = h.engine.create_exam(TEACHER, new).await.expect_err("zero attempts");
        assert!(matches!(err, LifecycleError::Validation(_)));

        let mut new = NewExam::new(CLASS, " ");
        new.duration_minutes = 10;
        let err = h.engine.create_exam(TEACHER, new).await.expect_err("blank title");
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test]
    async fn update_and_delete_only_while_draft() {
        let h = Harness::new();
        h.draft_exam("exam-1").await;

        let changes = ExamChanges { max_attempts: Some(3), ..ExamChanges::default() };
        let updated = h.engine.update_exam("exam-1", TEACHER, changes).await.expect("update");
        assert_eq!(updated.max_attempts, 3);

        h.engine.publish("exam-1", TEACHER).await.expect("publish");
        let err = h
            .engine
            .update_exam("exam-1", TEACHER, ExamChanges::default())
            .await
            .expect_err("published");
        assert!(matches!(err, LifecycleError::InvalidState(_)));
        let err = h.engine.delete_exam("exam-1", TEACHER).await.expect_err("published");
        assert!(matches!(err, LifecycleError::InvalidState(_)));

        h.draft_exam("exam-2").await;
        h.engine.delete_exam("exam-2", TEACHER).await.expect("delete draft");
        assert!(h.store.find_exam("exam-2").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn students_cannot_view_drafts() {
        let h = Harness::new();
        h.draft_exam("exam-1").await;
        assert!(h.engine.view_exam("exam-1", TEACHER).await.is_ok());
        let err = h.engine.view_exam("exam-1", STUDENT).await.expect_err("draft hidden");
        assert!(matches!(err, LifecycleError::Forbidden(_)));

        h.engine.publish("exam-1", TEACHER).await.expect("publish");
        assert!(h.engine.view_exam("exam-1", STUDENT).await.is_ok());
    }
}
