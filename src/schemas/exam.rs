use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::core::time::{format_offset, to_utc};
use crate::db::models::{Exam, ExamSettings, QuestionPaper};
use crate::db::types::{EvaluationMode, ExamStatus};
use crate::lifecycle::{ExamChanges, NewExam};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamSettingsPayload {
    #[serde(default = "default_tab_switch_limit", alias = "tabSwitchLimit")]
    #[validate(range(max = 1000, message = "tab_switch_limit is too large"))]
    pub(crate) tab_switch_limit: Option<u32>,
    #[serde(default = "default_enabled_true", alias = "allowPdfUpload")]
    pub(crate) allow_pdf_upload: bool,
    #[serde(default, alias = "allowEditor")]
    pub(crate) allow_editor: bool,
}

impl From<ExamSettingsPayload> for ExamSettings {
    fn from(payload: ExamSettingsPayload) -> Self {
        Self {
            tab_switch_limit: payload.tab_switch_limit,
            allow_pdf_upload: payload.allow_pdf_upload,
            allow_editor: payload.allow_editor,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[serde(alias = "classId")]
    #[validate(length(min = 1, message = "class_id must not be empty"))]
    pub(crate) class_id: String,
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default = "default_duration", alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default = "default_total_marks", alias = "totalMarks")]
    #[validate(range(min = 0, message = "total_marks must be non-negative"))]
    pub(crate) total_marks: i32,
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: i32,
    #[serde(default = "default_evaluation_mode", alias = "evaluationMode")]
    pub(crate) evaluation_mode: EvaluationMode,
    #[serde(
        default,
        alias = "startTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "endTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) end_time: Option<OffsetDateTime>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) settings: Option<ExamSettingsPayload>,
}

impl From<ExamCreate> for NewExam {
    fn from(payload: ExamCreate) -> Self {
        let mut exam = NewExam::new(payload.class_id, payload.title);
        exam.description = payload.description.unwrap_or_default();
        exam.duration_minutes = payload.duration_minutes;
        exam.total_marks = payload.total_marks;
        exam.max_attempts = payload.max_attempts;
        exam.evaluation_mode = payload.evaluation_mode;
        exam.start_time = payload.start_time.map(to_utc);
        exam.end_time = payload.end_time.map(to_utc);
        if let Some(settings) = payload.settings {
            exam.settings = settings.into();
        }
        exam
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "totalMarks")]
    #[validate(range(min = 0, message = "total_marks must be non-negative"))]
    pub(crate) total_marks: Option<i32>,
    #[serde(default, alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default, alias = "evaluationMode")]
    pub(crate) evaluation_mode: Option<EvaluationMode>,
    #[serde(
        default,
        alias = "startTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "endTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) end_time: Option<OffsetDateTime>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) settings: Option<ExamSettingsPayload>,
}

impl From<ExamUpdate> for ExamChanges {
    fn from(payload: ExamUpdate) -> Self {
        Self {
            title: payload.title,
            description: payload.description,
            duration_minutes: payload.duration_minutes,
            total_marks: payload.total_marks,
            max_attempts: payload.max_attempts,
            evaluation_mode: payload.evaluation_mode,
            start_time: payload.start_time.map(to_utc),
            end_time: payload.end_time.map(to_utc),
            settings: payload.settings.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) created_by: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: i32,
    pub(crate) max_attempts: i32,
    pub(crate) evaluation_mode: EvaluationMode,
    pub(crate) start_time: Option<String>,
    pub(crate) end_time: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) settings: ExamSettings,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
    pub(crate) started_at: Option<String>,
    pub(crate) closed_at: Option<String>,
    pub(crate) evaluation_started_at: Option<String>,
    pub(crate) results_published_at: Option<String>,
    pub(crate) papers_generated_at: Option<String>,
    pub(crate) paper_count: usize,
}

impl From<Exam> for ExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            id: exam.id,
            class_id: exam.class_id,
            created_by: exam.created_by,
            title: exam.title,
            description: exam.description,
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            max_attempts: exam.max_attempts,
            evaluation_mode: exam.evaluation_mode,
            start_time: exam.start_time.map(format_offset),
            end_time: exam.end_time.map(format_offset),
            status: exam.status,
            settings: exam.settings.0,
            created_at: format_offset(exam.created_at),
            updated_at: format_offset(exam.updated_at),
            published_at: exam.published_at.map(format_offset),
            started_at: exam.started_at.map(format_offset),
            closed_at: exam.closed_at.map(format_offset),
            evaluation_started_at: exam.evaluation_started_at.map(format_offset),
            results_published_at: exam.results_published_at.map(format_offset),
            papers_generated_at: exam.papers_generated_at.map(format_offset),
            paper_count: exam.papers.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperResponse {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) set_number: u32,
    pub(crate) paper_ref: String,
}

impl PaperResponse {
    pub(crate) fn new(exam_id: String, paper: QuestionPaper) -> Self {
        Self {
            exam_id,
            student_id: paper.student_id,
            set_number: paper.set_number,
            paper_ref: paper.paper_ref,
        }
    }
}

fn default_duration() -> i32 {
    crate::lifecycle::DEFAULT_DURATION_MINUTES
}

fn default_total_marks() -> i32 {
    crate::lifecycle::DEFAULT_TOTAL_MARKS
}

fn default_max_attempts() -> i32 {
    crate::lifecycle::DEFAULT_MAX_ATTEMPTS
}

fn default_evaluation_mode() -> EvaluationMode {
    EvaluationMode::Manual
}

fn default_tab_switch_limit() -> Option<u32> {
    ExamSettings::default().tab_switch_limit
}

fn default_enabled_true() -> bool {
    true
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs arrive without an offset; treat them as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}
