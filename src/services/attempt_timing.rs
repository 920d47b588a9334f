use time::{Duration, OffsetDateTime};

use crate::db::models::{Attempt, Exam};

pub(crate) fn attempt_deadline(exam: &Exam, attempt: &Attempt) -> OffsetDateTime {
    attempt.started_at + Duration::minutes(i64::from(exam.duration_minutes))
}

/// An attempt is overdue once its full duration has elapsed; the exam window does not shorten it.
pub(crate) fn is_overdue(exam: &Exam, attempt: &Attempt, now: OffsetDateTime) -> bool {
    now >= attempt_deadline(exam, attempt)
}

pub(crate) fn remaining_seconds(exam: &Exam, attempt: &Attempt, now: OffsetDateTime) -> i64 {
    (attempt_deadline(exam, attempt) - now).whole_seconds().max(0)
}
