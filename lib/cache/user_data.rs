//! Caller-attached annotations on cache objects.
//!
//! Records survive refreshes, renames and missing-to-present rebirths because those all
//! update the object in place. A record's destructor runs when its object is destroyed,
//! always after the cache lock has been released, so it may call back into the cache.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Key a user-data record is filed under. One record per key per object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserDataKey(pub u32);

type Destructor = Box<dyn FnOnce() + Send>;

pub(crate) struct UserDataRecord {
    pub key: UserDataKey,
    pub value: Arc<dyn Any + Send + Sync>,
    on_destroy: Option<Destructor>,
}

impl UserDataRecord {
    pub(crate) fn new<T: Any + Send + Sync>(key: UserDataKey, value: Arc<T>) -> Self {
        Self {
            key,
            value,
            on_destroy: None,
        }
    }

    pub(crate) fn with_destructor<T, F>(key: UserDataKey, value: Arc<T>, destructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) + Send + 'static,
    {
        let held = Arc::clone(&value);
        Self {
            key,
            value,
            on_destroy: Some(Box::new(move || destructor(&held))),
        }
    }

    pub(crate) fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Run the destructor, if any. Must not be called with the cache lock held.
    pub(crate) fn bury(self) {
        if let Some(destructor) = self.on_destroy {
            destructor();
        }
    }
}

impl fmt::Debug for UserDataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDataRecord")
            .field("key", &self.key)
            .field("has_destructor", &self.on_destroy.is_some())
            .finish_non_exhaustive()
    }
}

/// Run the destructors of records collected while the lock was held.
pub(crate) fn bury_all(records: Vec<UserDataRecord>) {
    for record in records {
        record.bury();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn destructor_sees_the_value() {
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        let record = UserDataRecord::with_destructor(UserDataKey(7), Arc::new(41usize), move |v| {
            sink.store(*v + 1, Ordering::SeqCst);
        });
        assert_eq!(record.downcast::<usize>().as_deref(), Some(&41));
        assert!(record.downcast::<String>().is_none());
        record.bury();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn records_without_destructor_bury_quietly() {
        bury_all(vec![UserDataRecord::new(UserDataKey(1), Arc::new("x"))]);
    }
}
