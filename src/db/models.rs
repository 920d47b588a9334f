use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::db::types::{
    AttemptStatus, EnrollmentStatus, EvaluationMode, ExamStatus, SubmissionReason, UserRole,
    ViolationType,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Class {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) teacher_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Enrollment {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) student_id: String,
    pub(crate) status: EnrollmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) enrolled_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ExamSettings {
    /// Tab switches tolerated before the attempt is force-submitted; `None` disables the limit.
    pub(crate) tab_switch_limit: Option<u32>,
    pub(crate) allow_pdf_upload: bool,
    pub(crate) allow_editor: bool,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self { tab_switch_limit: Some(3), allow_pdf_upload: true, allow_editor: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) created_by: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: i32,
    pub(crate) max_attempts: i32,
    pub(crate) evaluation_mode: EvaluationMode,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) end_time: Option<OffsetDateTime>,
    pub(crate) status: ExamStatus,
    pub(crate) settings: Json<ExamSettings>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) closed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) evaluation_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) results_published_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub(crate) papers: Json<Vec<QuestionPaper>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) papers_generated_at: Option<OffsetDateTime>,
}

/// A generated question paper assigned to one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QuestionPaper {
    pub(crate) student_id: String,
    pub(crate) set_number: u32,
    pub(crate) paper_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ViolationEntry {
    #[serde(rename = "type")]
    pub(crate) kind: ViolationType,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) timestamp: OffsetDateTime,
}

/// Proctoring state embedded in an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IntegrityRecord {
    pub(crate) tab_switches: u32,
    pub(crate) focus_lost_count: u32,
    pub(crate) fullscreen_exit_count: u32,
    pub(crate) copy_events: u32,
    pub(crate) paste_events: u32,
    pub(crate) violations: Vec<ViolationEntry>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) last_active_at: OffsetDateTime,
    pub(crate) auto_submitted: bool,
}

impl IntegrityRecord {
    pub(crate) fn new(started_at: OffsetDateTime) -> Self {
        Self {
            tab_switches: 0,
            focus_lost_count: 0,
            fullscreen_exit_count: 0,
            copy_events: 0,
            paste_events: 0,
            violations: Vec::new(),
            last_active_at: started_at,
            auto_submitted: false,
        }
    }

    /// Counts the event, appends it to the log and refreshes liveness.
    pub(crate) fn record(&mut self, kind: ViolationType, at: OffsetDateTime) {
        match kind {
            ViolationType::TabSwitch => self.tab_switches += 1,
            ViolationType::FocusLost => self.focus_lost_count += 1,
            ViolationType::FullscreenExit => self.fullscreen_exit_count += 1,
            ViolationType::Copy => self.copy_events += 1,
            ViolationType::Paste => self.paste_events += 1,
            // Logged only; no dedicated counter.
            ViolationType::SuspiciousActivity => {}
        }
        self.violations.push(ViolationEntry { kind, timestamp: at });
        self.last_active_at = at;
    }

    pub(crate) fn touch(&mut self, at: OffsetDateTime) {
        self.last_active_at = at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) submitted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(crate) evaluated_at: Option<OffsetDateTime>,
    pub(crate) submission_reason: Option<SubmissionReason>,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) answer_artifact: Option<String>,
    pub(crate) integrity: Json<IntegrityRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}
