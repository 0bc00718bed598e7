//! # scribedb-core
//!
//! ScribeDB: an embeddable document store with live, incrementally
//! maintained queries.
//!
//! Applications present JSON records identified by stable string keys
//! within named indexes; the core stores the records, maintains inverted
//! indexes over configurable fields, answers ad-hoc queries with sort and
//! pagination, and lets clients subscribe to a query and receive change
//! notifications whenever the visible result page is affected by
//! subsequent writes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scribedb_core::{Config, FieldDefinition, IndexSchema, ScribeDb, SearchOptions};
//! use serde_json::json;
//!
//! let db = ScribeDb::open(Config::default()).await?;
//! db.create_index(IndexSchema::new(
//!     "tickets",
//!     vec![FieldDefinition::text("status", "/Status")],
//! ))
//! .await?;
//!
//! db.insert("tickets", "2653", json!({"Status": "Open"})).await?;
//!
//! let mut sub = db.subscribe("tickets", "status:open", SearchOptions::default())?;
//! while let Some(event) = sub.next_event().await {
//!     // Change { records, total } on every write that affects the page
//! }
//! ```

pub mod admin;
pub mod db;
pub mod error;
pub mod mutator;
pub mod registry;

pub use db::{ScribeDb, SearchOptions, SearchResult, Stats};
pub use error::{Result, ScribeDbError};

// The surface consumers need without naming the member crates.
pub use scribedb_commons::{
    Config, FieldDefinition, IndexName, IndexSchema, Job, JobId, RecordId, SortDir,
    SorterDefinition,
};
pub use scribedb_live::{Subscriber, SubscriberEvent};
pub use scribedb_store::{FileBackend, MemoryBackend, StorageBackend};
