//! Storage backend abstraction for pluggable storage implementations.
//!
//! The trait defines byte-level key/value operations; everything typed
//! (JSON values, hashes, locks) lives in [`crate::record_store`]. Keys are
//! `/`-separated paths produced by the configuration helpers, e.g.
//! `scribedb/records/myapp/2653`.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background queue is closed")]
    QueueClosed,

    #[error("Storage error: {0}")]
    Other(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Trait for pluggable storage backend implementations.
///
/// Implementations must be thread-safe; all synchronisation beyond simple
/// key atomicity (advisory locks, queues) is layered on top by the record
/// store, so backends stay dumb.
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key. `Ok(None)` when the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a key/value pair, replacing any existing value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Deletes a key. Idempotent: deleting a missing key is `Ok(())`.
    fn delete(&self, key: &str) -> Result<()>;

    /// Lists all keys starting with the given prefix.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Number of stored keys.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
