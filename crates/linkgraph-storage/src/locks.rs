//! Per-key exclusive locks.
//!
//! [`KeyLocks`] hands out one mutex per key from a `DashMap`, so writers to
//! different keys never contend. Entries are created on first use and
//! dropped again by [`KeyLocks::prune_idle`] once nobody holds them.

use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::StorageError;

/// A table of per-key mutexes.
#[derive(Debug)]
pub struct KeyLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyLocks<K> {
    pub fn new() -> Self {
        KeyLocks {
            locks: DashMap::new(),
        }
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> Result<R, StorageError> {
        // Cloned under the shard lock: a held Arc always has count >= 2, so
        // pruning can never drop an entry someone is about to lock.
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = mutex
            .lock()
            .map_err(|_| StorageError::poisoned("key lock"))?;
        Ok(f())
    }

    /// Removes entries no caller currently holds. Returns how many were
    /// removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of keys with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
