//! Typed record store over a [`StorageBackend`].
//!
//! Adds what the document core needs on top of raw bytes:
//! - JSON values in and out (`get`/`put`/`delete`/`get_multi`)
//! - Persisted hashes (`hash_*`), each stored as one JSON object under its
//!   path key, with paged share-locked iteration
//! - Per-key advisory locks with RAII guards
//! - The single-consumer background queue used for live-view fan-out

use crate::locks::{ExclusiveLock, LockManager, SharedLock};
use crate::queue::TaskQueue;
use crate::storage_trait::{Result, StorageBackend};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Counters exposed through the facade's `get_stats`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub keys: usize,
    pub queue_pending: usize,
    pub locked_keys: usize,
}

/// The storage surface consumed by the mutator, the index engine and the
/// view layer.
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
    locks: LockManager,
    queue: TaskQueue,
    hash_page_size: usize,
}

impl RecordStore {
    /// Must run inside a tokio runtime (the queue spawns its worker).
    pub fn new(backend: Arc<dyn StorageBackend>, hash_page_size: usize) -> Self {
        Self {
            backend,
            locks: LockManager::new(),
            queue: TaskQueue::new(),
            hash_page_size,
        }
    }

    // ---- plain keys ----

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, &bytes)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key)
    }

    /// Bulk load; the result aligns with `keys` (missing keys yield `None`).
    pub async fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Deletes every key under the prefix; returns how many went away.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.backend.list_prefix(prefix)?;
        let count = keys.len();
        for key in &keys {
            self.backend.delete(key)?;
        }
        Ok(count)
    }

    // ---- advisory locks ----

    pub async fn lock_exclusive(&self, key: &str) -> ExclusiveLock {
        self.locks.exclusive(key).await
    }

    pub async fn lock_shared(&self, key: &str) -> SharedLock {
        self.locks.shared(key).await
    }

    // ---- hashes ----
    //
    // A hash is one JSON object persisted under `path`. Mutations take the
    // path's exclusive lock for the read-modify-write; iteration takes the
    // shared lock for its whole duration, so a concurrent writer blocks
    // until the pager is done rather than invalidating it.

    async fn load_hash(&self, path: &str) -> Result<Map<String, Value>> {
        match self.get(path).await? {
            Some(Value::Object(map)) => Ok(map),
            Some(_) | None => Ok(Map::new()),
        }
    }

    async fn store_hash(&self, path: &str, map: Map<String, Value>) -> Result<()> {
        if map.is_empty() {
            self.delete(path).await
        } else {
            self.put(path, &Value::Object(map)).await
        }
    }

    pub async fn hash_put(&self, path: &str, key: &str, value: Value) -> Result<()> {
        let _lock = self.locks.exclusive(path).await;
        let mut map = self.load_hash(path).await?;
        map.insert(key.to_string(), value);
        self.store_hash(path, map).await
    }

    pub async fn hash_get(&self, path: &str, key: &str) -> Result<Option<Value>> {
        let _lock = self.locks.shared(path).await;
        Ok(self.load_hash(path).await?.remove(key))
    }

    pub async fn hash_delete(&self, path: &str, key: &str) -> Result<()> {
        let _lock = self.locks.exclusive(path).await;
        let mut map = self.load_hash(path).await?;
        map.remove(key);
        self.store_hash(path, map).await
    }

    /// Adds `delta` to a numeric hash entry, creating it on first use and
    /// removing it when the count drops to zero. Returns the new count.
    pub async fn hash_incr(&self, path: &str, key: &str, delta: i64) -> Result<i64> {
        let _lock = self.locks.exclusive(path).await;
        let mut map = self.load_hash(path).await?;
        let current = map.get(key).and_then(Value::as_i64).unwrap_or(0);
        let next = current + delta;
        if next <= 0 {
            map.remove(key);
        } else {
            map.insert(key.to_string(), Value::from(next));
        }
        self.store_hash(path, map).await?;
        Ok(next.max(0))
    }

    pub async fn hash_get_all(&self, path: &str) -> Result<Map<String, Value>> {
        let _lock = self.locks.shared(path).await;
        self.load_hash(path).await
    }

    pub async fn hash_len(&self, path: &str) -> Result<usize> {
        let _lock = self.locks.shared(path).await;
        Ok(self.load_hash(path).await?.len())
    }

    /// Paged iteration over a hash, share-locking it for the duration.
    ///
    /// Pages are at most `hash_page_size` entries, in key order.
    pub async fn hash_each_page<F>(&self, path: &str, mut page_fn: F) -> Result<()>
    where
        F: FnMut(&[(String, Value)]),
    {
        let _lock = self.locks.shared(path).await;
        let map = self.load_hash(path).await?;
        let entries: Vec<(String, Value)> = map.into_iter().collect();
        for page in entries.chunks(self.hash_page_size.max(1)) {
            page_fn(page);
        }
        Ok(())
    }

    // ---- background queue ----

    pub fn enqueue<F>(&self, label: impl Into<String>, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queue.enqueue(label, future)
    }

    /// Waits until the background queue has drained.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Drains and stops the background queue.
    pub async fn close(&self) {
        self.queue.close().await;
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.backend.len().unwrap_or(0),
            queue_pending: self.queue.pending(),
            locked_keys: self.locks.len(),
        }
    }
}
