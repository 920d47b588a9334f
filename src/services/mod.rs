pub(crate) mod ai_grading;
pub(crate) mod attempt_timing;
pub(crate) mod notifications;
pub(crate) mod paper_generation;
pub(crate) mod record_locks;
