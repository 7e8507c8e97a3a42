use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use course_core::model::{CourseId, UserId};

/// Registry of per-(user, course) async mutexes.
///
/// Mutations of one learner's progress on one course are serialized so
/// concurrent lesson and quiz updates cannot lose writes; distinct pairs
/// proceed in parallel. Entries are created on first use and live for the
/// registry's lifetime.
#[derive(Clone, Default)]
pub(crate) struct ProgressLocks {
    inner: Arc<StdMutex<HashMap<(UserId, CourseId), Arc<AsyncMutex<()>>>>>,
}

impl ProgressLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding one learner's progress on one course.
    pub(crate) fn for_key(&self, user_id: UserId, course_id: CourseId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry((user_id, course_id)).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_mutex() {
        let locks = ProgressLocks::new();
        let a = locks.for_key(UserId::new(1), CourseId::new(2));
        let b = locks.for_key(UserId::new(1), CourseId::new(2));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_get_distinct_mutexes() {
        let locks = ProgressLocks::new();
        let a = locks.for_key(UserId::new(1), CourseId::new(2));
        let b = locks.for_key(UserId::new(1), CourseId::new(3));
        let c = locks.for_key(UserId::new(2), CourseId::new(2));
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
