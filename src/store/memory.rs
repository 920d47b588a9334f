use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;

use super::{AttemptFilter, Store, StoreError};
use crate::db::models::{Attempt, Class, Enrollment, Exam, User};
use crate::db::types::{AttemptStatus, ExamStatus};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    classes: HashMap<String, Class>,
    enrollments: Vec<Enrollment>,
    exams: HashMap<String, Exam>,
    attempts: HashMap<String, Attempt>,
    /// Attempt ids whose writes fail, for exercising error paths.
    rejected_writes: HashSet<String>,
}

/// Directory data loaded into a memory-backed deployment at startup.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MemorySeed {
    pub(crate) users: Vec<User>,
    pub(crate) classes: Vec<Class>,
    pub(crate) enrollments: Vec<Enrollment>,
}

/// Process-local store with the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_seed(seed: MemorySeed) -> Self {
        let store = Self::new();
        for user in seed.users {
            store.insert_user(user);
        }
        for class in seed.classes {
            store.insert_class(class);
        }
        for enrollment in seed.enrollments {
            store.insert_enrollment(enrollment);
        }
        store
    }

    pub(crate) fn from_seed_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: MemorySeed = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            users = seed.users.len(),
            classes = seed.classes.len(),
            enrollments = seed.enrollments.len(),
            "Loaded memory store seed"
        );
        Ok(Self::from_seed(seed))
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn insert_user(&self, user: User) {
        self.tables().users.insert(user.id.clone(), user);
    }

    pub(crate) fn insert_class(&self, class: Class) {
        self.tables().classes.insert(class.id.clone(), class);
    }

    pub(crate) fn insert_enrollment(&self, enrollment: Enrollment) {
        let mut tables = self.tables();
        tables.enrollments.retain(|existing| {
            existing.class_id != enrollment.class_id || existing.student_id != enrollment.student_id
        });
        tables.enrollments.push(enrollment);
    }

    #[cfg(test)]
    pub(crate) fn reject_writes_to(&self, attempt_id: &str) {
        self.tables().rejected_writes.insert(attempt_id.to_string());
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables().users.get(id).cloned())
    }

    async fn find_class(&self, id: &str) -> Result<Option<Class>, StoreError> {
        Ok(self.tables().classes.get(id).cloned())
    }

    async fn find_enrollment(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self
            .tables()
            .enrollments
            .iter()
            .find(|item| item.class_id == class_id && item.student_id == student_id)
            .cloned())
    }

    async fn list_enrollments(&self, class_id: &str) -> Result<Vec<Enrollment>, StoreError> {
        Ok(self
            .tables()
            .enrollments
            .iter()
            .filter(|item| item.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(self.tables().exams.get(id).cloned())
    }

    async fn create_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.exams.contains_key(&exam.id) {
            return Err(StoreError::Conflict { entity: "exam", id: exam.id.clone() });
        }
        tables.exams.insert(exam.id.clone(), exam.clone());
        Ok(())
    }

    async fn save_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        let mut tables = self.tables();
        match tables.exams.get_mut(&exam.id) {
            Some(slot) => {
                *slot = exam.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict { entity: "exam", id: exam.id.clone() }),
        }
    }

    async fn delete_exam(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let removed = tables.exams.remove(id).is_some();
        if removed {
            tables.attempts.retain(|_, attempt| attempt.exam_id != id);
        }
        Ok(removed)
    }

    async fn list_exams_by_status(&self, status: ExamStatus) -> Result<Vec<Exam>, StoreError> {
        let mut exams: Vec<Exam> =
            self.tables().exams.values().filter(|exam| exam.status == status).cloned().collect();
        exams.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(exams)
    }

    async fn find_attempt(&self, id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(self.tables().attempts.get(id).cloned())
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> Result<Vec<Attempt>, StoreError> {
        let mut attempts: Vec<Attempt> = self
            .tables()
            .attempts
            .values()
            .filter(|attempt| filter.matches(attempt))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| {
            a.started_at.cmp(&b.started_at).then_with(|| a.attempt_number.cmp(&b.attempt_number))
        });
        Ok(attempts)
    }

    async fn count_attempts(&self, filter: &AttemptFilter) -> Result<i64, StoreError> {
        let count = self.tables().attempts.values().filter(|attempt| filter.matches(attempt)).count();
        Ok(count as i64)
    }

    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let clashes = tables.attempts.values().any(|existing| {
            existing.exam_id == attempt.exam_id
                && existing.student_id == attempt.student_id
                && (existing.attempt_number == attempt.attempt_number
                    || (existing.status == AttemptStatus::InProgress
                        && attempt.status == AttemptStatus::InProgress))
        });
        if clashes || tables.attempts.contains_key(&attempt.id) {
            return Err(StoreError::Conflict { entity: "attempt", id: attempt.id.clone() });
        }
        tables.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn save_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.rejected_writes.contains(&attempt.id) {
            return Err(StoreError::Conflict { entity: "attempt", id: attempt.id.clone() });
        }
        match tables.attempts.get_mut(&attempt.id) {
            Some(slot) => {
                *slot = attempt.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict { entity: "attempt", id: attempt.id.clone() }),
        }
    }
}
