use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Teacher,
    Student,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "enrollmentstatus", rename_all = "lowercase")]
pub(crate) enum EnrollmentStatus {
    Active,
    Pending,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "examstatus", rename_all = "snake_case")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Live,
    Closed,
    Evaluating,
    ResultPublished,
}

impl ExamStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Live => "live",
            Self::Closed => "closed",
            Self::Evaluating => "evaluating",
            Self::ResultPublished => "result_published",
        }
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
    Evaluated,
}

impl AttemptStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "evaluationmode", rename_all = "lowercase")]
pub(crate) enum EvaluationMode {
    Manual,
    Ai,
    Hybrid,
}

/// Why an attempt left `in_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionreason", rename_all = "snake_case")]
pub(crate) enum SubmissionReason {
    Manual,
    Timeout,
    ViolationLimit,
    ExamClosed,
}

impl SubmissionReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Timeout => "timeout",
            Self::ViolationLimit => "violation_limit",
            Self::ExamClosed => "exam_closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ViolationType {
    TabSwitch,
    FocusLost,
    FullscreenExit,
    Copy,
    Paste,
    SuspiciousActivity,
}

impl ViolationType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::FocusLost => "focus_lost",
            Self::FullscreenExit => "fullscreen_exit",
            Self::Copy => "copy",
            Self::Paste => "paste",
            Self::SuspiciousActivity => "suspicious_activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid violation type: {0}")]
pub(crate) struct UnknownViolationType(pub(crate) String);

impl FromStr for ViolationType {
    type Err = UnknownViolationType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tab_switch" => Ok(Self::TabSwitch),
            "focus_lost" => Ok(Self::FocusLost),
            "fullscreen_exit" => Ok(Self::FullscreenExit),
            "copy" => Ok(Self::Copy),
            "paste" => Ok(Self::Paste),
            "suspicious_activity" => Ok(Self::SuspiciousActivity),
            other => Err(UnknownViolationType(other.to_string())),
        }
    }
}
