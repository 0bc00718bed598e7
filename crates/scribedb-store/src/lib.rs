//! # scribedb-store
//!
//! Storage layer for ScribeDB.
//!
//! The layering mirrors a classic pluggable-store design:
//!
//! ```text
//! RecordStore       ← typed JSON values, hashes, locks, background queue
//!     ↓
//! StorageBackend    ← generic byte-level K/V operations (trait)
//!     ↓
//! Memory / files    ← actual storage implementation
//! ```
//!
//! `RecordStore` is what the rest of the system consumes: besides plain
//! key/value access it provides persisted hashes with paged share-locked
//! iteration, per-key advisory locks with RAII guards, and a single-consumer
//! background task queue that serialises live-view updates.

pub mod file_backend;
pub mod locks;
pub mod memory_backend;
pub mod queue;
pub mod record_store;
pub mod storage_trait;

pub use file_backend::FileBackend;
pub use locks::{ExclusiveLock, LockManager, SharedLock};
pub use memory_backend::MemoryBackend;
pub use queue::TaskQueue;
pub use record_store::{RecordStore, StoreStats};
pub use storage_trait::{Result, StorageBackend, StoreError};
