use serde::Serialize;

use super::{ExamEngine, LifecycleResult};
use crate::db::types::{AttemptStatus, ExamStatus};
use crate::store::AttemptFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct SweepReport {
    pub(crate) exams_started: usize,
    pub(crate) attempts_auto_submitted: usize,
    pub(crate) exams_closed: usize,
}

impl ExamEngine {
    /// Eager counterpart of the lazy in-request checks: starts due exams, times out
    /// overdue attempts with the same comparison heartbeat uses, then closes ended exams.
    pub(crate) async fn sweep(&self) -> LifecycleResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = self.now();

        for exam in self.store().list_exams_by_status(ExamStatus::Published).await? {
            if exam.start_time.map_or(true, |start| start > now) {
                continue;
            }
            match self.start(&exam.id, None).await {
                Ok(_) => report.exams_started += 1,
                Err(err) => {
                    tracing::warn!(exam_id = %exam.id, error = %err, "Sweep failed to start exam")
                }
            }
        }

        for status in [ExamStatus::Live, ExamStatus::Closed] {
            for exam in self.store().list_exams_by_status(status).await? {
                let open = AttemptFilter::for_exam(&exam.id).with_status(AttemptStatus::InProgress);
                for candidate in self.store().list_attempts(&open).await? {
                    match self.expire_if_overdue(&exam, &candidate.id).await {
                        Ok(true) => report.attempts_auto_submitted += 1,
                        Ok(false) => {}
                        Err(err) => tracing::warn!(
                            exam_id = %exam.id,
                            attempt_id = %candidate.id,
                            error = %err,
                            "Sweep failed to time out attempt"
                        ),
                    }
                }
            }
        }

        for exam in self.store().list_exams_by_status(ExamStatus::Live).await? {
            if exam.end_time.map_or(true, |end| end > now) {
                continue;
            }
            match self.close(&exam.id, None).await {
                Ok(_) => report.exams_closed += 1,
                Err(err) => {
                    tracing::warn!(exam_id = %exam.id, error = %err, "Sweep failed to close exam")
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                exams_started = report.exams_started,
                attempts_auto_submitted = report.attempts_auto_submitted,
                exams_closed = report.exams_closed,
                action = "sweep",
                "Sweep applied changes"
            );
        }
        Ok(report)
    }
}
