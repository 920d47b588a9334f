use crate::db::types::{AttemptStatus, ExamStatus};
use crate::lifecycle::errors::{LifecycleError, LifecycleResult};

/// A closed set of states with an explicit table of allowed successors.
pub(crate) trait StateMachine: Copy + Eq + 'static {
    const ENTITY: &'static str;

    fn name(self) -> &'static str;

    fn allowed_next(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }
}

impl StateMachine for ExamStatus {
    const ENTITY: &'static str = "exam";

    fn name(self) -> &'static str {
        self.as_str()
    }

    fn allowed_next(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Published],
            Self::Published => &[Self::Live],
            Self::Live => &[Self::Closed],
            Self::Closed => &[Self::Evaluating],
            Self::Evaluating => &[Self::ResultPublished],
            Self::ResultPublished => &[],
        }
    }
}

impl StateMachine for AttemptStatus {
    const ENTITY: &'static str = "attempt";

    fn name(self) -> &'static str {
        self.as_str()
    }

    fn allowed_next(self) -> &'static [Self] {
        match self {
            Self::InProgress => &[Self::Submitted],
            Self::Submitted => &[Self::Evaluated],
            Self::Evaluated => &[],
        }
    }
}

pub(crate) fn ensure_transition<S: StateMachine>(from: S, to: S) -> LifecycleResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition { entity: S::ENTITY, from: from.name(), to: to.name() })
    }
}
