//! Per-key advisory locks with RAII guards.
//!
//! The write path takes an exclusive lock on a record key for its whole
//! critical section; paged hash iteration takes a shared lock so concurrent
//! writers to the same hash block until the iteration finishes. Guards
//! release on drop, so every exit path (including `?` returns) unlocks.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Exclusive hold on one key. Dropping releases.
pub struct ExclusiveLock {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// Shared hold on one key. Dropping releases.
pub struct SharedLock {
    _guard: OwnedRwLockReadGuard<()>,
}

/// Advisory lock table keyed by storage key.
///
/// Entries are created on demand and kept; the table is bounded by the set
/// of keys ever locked, which in practice is the live record set.
#[derive(Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Waits for and takes the exclusive lock on `key`.
    pub async fn exclusive(&self, key: &str) -> ExclusiveLock {
        let lock = self.entry(key);
        ExclusiveLock {
            _guard: lock.write_owned().await,
        }
    }

    /// Waits for and takes a shared lock on `key`.
    pub async fn shared(&self, key: &str) -> SharedLock {
        let lock = self.entry(key);
        SharedLock {
            _guard: lock.read_owned().await,
        }
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
