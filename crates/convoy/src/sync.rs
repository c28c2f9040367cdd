//! Synchronization primitives shared across Convoy.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Per-key async mutex.
///
/// Operations on the same key are serialized; different keys proceed
/// concurrently. Entries are kept for the life of the map, so keys should come
/// from a small set (codebase ids, not message ids).
///
/// ```ignore
/// let locks = KeyedLocks::new();
/// let lock = locks.get(&codebase.id);
/// let _guard = lock.lock().await;
/// // read, modify and save the record
/// ```
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for `key`.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let entry = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_one_lock() {
        let locks = KeyedLocks::new();
        assert!(Arc::ptr_eq(&locks.get("cb-1"), &locks.get("cb-1")));
        assert!(!Arc::ptr_eq(&locks.get("cb-1"), &locks.get("cb-2")));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn same_key_serializes_and_other_keys_do_not() {
        let locks = KeyedLocks::new();
        let held = locks.get("cb-1");
        let _guard = held.lock().await;

        assert!(locks.get("cb-1").try_lock().is_err());
        assert!(locks.get("cb-2").try_lock().is_ok());
    }
}
