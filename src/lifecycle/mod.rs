//! Exam and attempt lifecycle engine.
//!
//! Every operation that mutates an exam or attempt runs under the matching
//! [`RecordLocks`] guard, so a read-modify-write is never interleaved with
//! another writer on the same record.

mod admission;
mod attempt_machine;
mod errors;
mod evaluation;
mod exam_machine;
mod integrity;
mod papers;
mod sweep;
mod transitions;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;

pub(crate) use admission::Eligibility;
pub(crate) use errors::{LifecycleError, LifecycleResult};
pub(crate) use evaluation::EvaluationSummary;
pub(crate) use exam_machine::{
    ExamChanges, NewExam, DEFAULT_DURATION_MINUTES, DEFAULT_MAX_ATTEMPTS, DEFAULT_TOTAL_MARKS,
};

use crate::core::clock::Clock;
use crate::db::models::{Attempt, Exam};
use crate::services::ai_grading::Grader;
use crate::services::notifications::{ExamEvent, NotificationOutbox, Notifier};
use crate::services::paper_generation::PaperGenerator;
use crate::services::record_locks::RecordLocks;
use crate::store::Store;

#[derive(Clone)]
pub(crate) struct ExamEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    grader: Arc<dyn Grader>,
    papers: Arc<dyn PaperGenerator>,
    outbox: NotificationOutbox,
    locks: RecordLocks,
    /// Long-running collaborator calls made outside the exam lock, keyed by `job:exam_id`.
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a job as running until dropped.
pub(super) struct InFlightJob {
    engine: ExamEngine,
    key: String,
}

impl Drop for InFlightJob {
    fn drop(&mut self) {
        self.engine.in_flight().remove(&self.key);
    }
}

impl ExamEngine {
    /// Spawns the notification delivery task, so this must run inside a Tokio runtime.
    pub(crate) fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        grader: Arc<dyn Grader>,
        papers: Arc<dyn PaperGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                clock,
                grader,
                papers,
                outbox: NotificationOutbox::spawn(notifier),
                locks: RecordLocks::new(),
                in_flight: Mutex::default(),
            }),
        }
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    fn locks(&self) -> &RecordLocks {
        &self.inner.locks
    }

    fn now(&self) -> OffsetDateTime {
        self.inner.clock.now()
    }

    async fn load_exam(&self, exam_id: &str) -> LifecycleResult<Exam> {
        self.store().find_exam(exam_id).await?.ok_or_else(|| LifecycleError::exam_not_found(exam_id))
    }

    async fn load_attempt(&self, attempt_id: &str) -> LifecycleResult<Attempt> {
        self.store()
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| LifecycleError::attempt_not_found(attempt_id))
    }

    /// Queues a lifecycle event for delivery and returns immediately.
    fn emit(&self, event: ExamEvent) {
        self.inner.outbox.enqueue(event);
    }

    #[cfg(test)]
    pub(crate) async fn flush_notifications(&self) {
        self.inner.outbox.flush().await;
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `None` when the same job is already running for this exam.
    fn begin_job(&self, job: &str, exam_id: &str) -> Option<InFlightJob> {
        let key = format!("{job}:{exam_id}");
        if !self.in_flight().insert(key.clone()) {
            return None;
        }
        Some(InFlightJob { engine: self.clone(), key })
    }

    fn job_running(&self, job: &str, exam_id: &str) -> bool {
        self.in_flight().contains(&format!("{job}:{exam_id}"))
    }
}
