use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-record async locks that serialize every read-modify-write of one exam,
/// attempt or admission slot. When both are needed, take the exam lock first.
#[derive(Default)]
pub(crate) struct RecordLocks {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

pub(crate) type RecordGuard = OwnedMutexGuard<()>;

impl RecordLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn exam(&self, exam_id: &str) -> RecordGuard {
        self.acquire(format!("exam:{exam_id}")).await
    }

    pub(crate) async fn attempt(&self, attempt_id: &str) -> RecordGuard {
        self.acquire(format!("attempt:{attempt_id}")).await
    }

    pub(crate) async fn admission(&self, exam_id: &str, student_id: &str) -> RecordGuard {
        self.acquire(format!("admission:{exam_id}:{student_id}")).await
    }

    async fn acquire(&self, key: String) -> RecordGuard {
        let lock = self.slot(key);
        lock.lock_owned().await
    }

    fn slot(&self, key: String) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = slots.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        slots.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        slots.insert(key, Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn live_slots(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
