use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use time::{Duration, OffsetDateTime};

use crate::api;
use crate::core::clock::{Clock, ManualClock};
use crate::core::{config::Settings, security, state::AppState};
use crate::db::models::Exam;
use crate::db::types::{ExamStatus, UserRole};
use crate::lifecycle::ExamEngine;
use crate::services::ai_grading::{GradeOutcome, Grader, GradingError};
use crate::services::notifications::{ExamEvent, ExamEventKind, Notifier, NotifyError};
use crate::services::paper_generation::{
    GeneratedPaper, PaperGenerationError, PaperGenerator, PaperRequest,
};
use crate::store::{MemoryStore, Store};

pub(crate) const TEACHER: &str = "teacher-1";
pub(crate) const OTHER_TEACHER: &str = "teacher-2";
pub(crate) const CLASS: &str = "class-1";
pub(crate) const STUDENT: &str = "student-1";
pub(crate) const STUDENT_2: &str = "student-2";
pub(crate) const STUDENT_3: &str = "student-3";
pub(crate) const OUTSIDER: &str = "student-9";

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAMS_ENV", "test");
    std::env::set_var("EXAMS_STRICT_CONFIG", "0");
    std::env::set_var("STORAGE_BACKEND", "memory");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("ALGORITHM", "HS256");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("SWEEP_INTERVAL_SECONDS");
    std::env::remove_var("MEMORY_SEED_PATH");
    std::env::remove_var("NOTIFY_WEBHOOK_URL");
    std::env::remove_var("PAPER_GENERATOR_BASE_URL");
    std::env::remove_var("PAPER_GENERATOR_TIMEOUT");
}

pub(crate) fn test_settings() -> Settings {
    let _guard = env_lock();
    set_test_env();
    Settings::load().expect("settings")
}

pub(crate) mod fixtures {
    use sqlx::types::Json;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    use crate::db::models::{Attempt, Class, Enrollment, Exam, ExamSettings, IntegrityRecord, User};
    use crate::db::types::{
        AttemptStatus, EnrollmentStatus, EvaluationMode, ExamStatus, UserRole,
    };

    pub(crate) fn base_time() -> OffsetDateTime {
        datetime!(2025-03-01 09:00 UTC)
    }

    pub(crate) fn user(id: &str, role: UserRole) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            full_name: format!("User {id}"),
            role,
            is_active: true,
            created_at: base_time() - Duration::days(30),
        }
    }

    pub(crate) fn class(id: &str, teacher_id: &str) -> Class {
        Class {
            id: id.to_string(),
            title: format!("Class {id}"),
            teacher_id: teacher_id.to_string(),
            created_at: base_time() - Duration::days(30),
        }
    }

    pub(crate) fn enrollment(class_id: &str, student_id: &str) -> Enrollment {
        Enrollment {
            id: format!("{class_id}:{student_id}"),
            class_id: class_id.to_string(),
            student_id: student_id.to_string(),
            status: EnrollmentStatus::Active,
            enrolled_at: base_time() - Duration::days(20),
        }
    }

    /// Draft exam over a three hour window starting at [`base_time`].
    pub(crate) fn exam(id: &str, class_id: &str, teacher_id: &str) -> Exam {
        let created = base_time() - Duration::days(1);
        Exam {
            id: id.to_string(),
            class_id: class_id.to_string(),
            created_by: teacher_id.to_string(),
            title: format!("Exam {id}"),
            description: String::new(),
            duration_minutes: 60,
            total_marks: 100,
            max_attempts: 1,
            evaluation_mode: EvaluationMode::Ai,
            start_time: Some(base_time()),
            end_time: Some(base_time() + Duration::hours(3)),
            status: ExamStatus::Draft,
            settings: Json(ExamSettings::default()),
            created_at: created,
            updated_at: created,
            published_at: None,
            started_at: None,
            closed_at: None,
            evaluation_started_at: None,
            results_published_at: None,
            papers: Json(Vec::new()),
            papers_generated_at: None,
        }
    }

    pub(crate) fn attempt(id: &str, exam_id: &str, student_id: &str, number: i32) -> Attempt {
        Attempt {
            id: id.to_string(),
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
            attempt_number: number,
            status: AttemptStatus::InProgress,
            started_at: base_time(),
            submitted_at: None,
            evaluated_at: None,
            submission_reason: None,
            score: None,
            feedback: None,
            answer_artifact: None,
            integrity: Json(IntegrityRecord::new(base_time())),
            updated_at: base_time(),
        }
    }
}

/// Grades every sheet with a fixed score unless told otherwise per attempt.
pub(crate) struct ScriptedGrader {
    default_score: f64,
    scripted: Mutex<HashMap<String, Result<f64, String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGrader {
    pub(crate) fn new(default_score: f64) -> Self {
        Self { default_score, scripted: Mutex::default(), calls: Mutex::default() }
    }

    pub(crate) fn default_score(&self) -> f64 {
        self.default_score
    }

    pub(crate) fn fail_for(&self, attempt_id: &str, message: &str) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(attempt_id.to_string(), Err(message.to_string()));
    }

    pub(crate) fn score_for(&self, attempt_id: &str, score: f64) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(attempt_id.to_string(), Ok(score));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Grader for ScriptedGrader {
    async fn grade(
        &self,
        attempt_id: &str,
        _answer_artifact: &str,
    ) -> Result<GradeOutcome, GradingError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(attempt_id.to_string());
        let scripted =
            self.scripted.lock().unwrap_or_else(PoisonError::into_inner).get(attempt_id).cloned();
        match scripted.unwrap_or(Ok(self.default_score)) {
            Ok(score) => Ok(GradeOutcome { score, feedback: Some("graded".to_string()) }),
            Err(message) => Err(GradingError::Transport(message)),
        }
    }
}

/// Hands back one paper per requested student unless told to fail.
#[derive(Default)]
pub(crate) struct ScriptedPapers {
    failure: Mutex<Option<String>>,
    requests: Mutex<Vec<PaperRequest>>,
}

impl ScriptedPapers {
    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    pub(crate) fn requests(&self) -> Vec<PaperRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl PaperGenerator for ScriptedPapers {
    async fn generate(
        &self,
        request: &PaperRequest,
    ) -> Result<Vec<GeneratedPaper>, PaperGenerationError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        if let Some(message) = self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(PaperGenerationError::Transport(message));
        }
        Ok(request
            .student_details
            .iter()
            .map(|student| GeneratedPaper {
                student_id: student.student_id.clone(),
                set_number: 1,
                paper_ref: format!("papers/{}/{}.pdf", request.exam_id, student.student_id),
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<ExamEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn events(&self) -> Vec<ExamEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn kinds(&self) -> Vec<ExamEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &ExamEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording notifier set to fail".to_string()));
        }
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
        Ok(())
    }
}

/// In-memory engine with a seeded class: one owning teacher, three enrolled
/// students, a second teacher and a student outside the class.
pub(crate) struct Harness {
    pub(crate) engine: ExamEngine,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) grader: Arc<ScriptedGrader>,
    pub(crate) papers: Arc<ScriptedPapers>,
    pub(crate) notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(fixtures::user(TEACHER, UserRole::Teacher));
        store.insert_user(fixtures::user(OTHER_TEACHER, UserRole::Teacher));
        for student in [STUDENT, STUDENT_2, STUDENT_3, OUTSIDER] {
            store.insert_user(fixtures::user(student, UserRole::Student));
        }
        store.insert_class(fixtures::class(CLASS, TEACHER));
        for student in [STUDENT, STUDENT_2, STUDENT_3] {
            store.insert_enrollment(fixtures::enrollment(CLASS, student));
        }

        let clock = Arc::new(ManualClock::new(fixtures::base_time() + Duration::minutes(10)));
        let grader = Arc::new(ScriptedGrader::new(75.0));
        let papers = Arc::new(ScriptedPapers::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = ExamEngine::new(
            store.clone(),
            clock.clone(),
            grader.clone(),
            papers.clone(),
            notifier.clone(),
        );

        Self { engine, store, clock, grader, papers, notifier }
    }

    pub(crate) async fn draft_exam(&self, id: &str) -> Exam {
        self.exam_in(id, ExamStatus::Draft).await
    }

    pub(crate) async fn live_exam(&self, id: &str) -> Exam {
        self.exam_in(id, ExamStatus::Live).await
    }

    /// Inserts an exam owned by [`TEACHER`] already sitting in `status`.
    pub(crate) async fn exam_in(&self, id: &str, status: ExamStatus) -> Exam {
        let mut exam = fixtures::exam(id, CLASS, TEACHER);
        let stamp: Option<OffsetDateTime> = Some(fixtures::base_time());
        let reached = |target: ExamStatus| order(status) >= order(target);
        exam.status = status;
        exam.published_at = stamp.filter(|_| reached(ExamStatus::Published));
        exam.started_at = stamp.filter(|_| reached(ExamStatus::Live));
        exam.closed_at = stamp.filter(|_| reached(ExamStatus::Closed));
        exam.evaluation_started_at = stamp.filter(|_| reached(ExamStatus::Evaluating));
        exam.results_published_at = stamp.filter(|_| reached(ExamStatus::ResultPublished));
        self.store.create_exam(&exam).await.expect("insert exam");
        exam
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub(crate) fn app(&self) -> (Router, Settings) {
        let settings = test_settings();
        let state = AppState::new(settings.clone(), self.engine.clone());
        (api::router::router(state), settings)
    }
}

fn order(status: ExamStatus) -> u8 {
    match status {
        ExamStatus::Draft => 0,
        ExamStatus::Published => 1,
        ExamStatus::Live => 2,
        ExamStatus::Closed => 3,
        ExamStatus::Evaluating => 4,
        ExamStatus::ResultPublished => 5,
    }
}

pub(crate) fn bearer_token(settings: &Settings, user_id: &str) -> String {
    security::create_access_token(user_id, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(crate) async fn read_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json body")
}
