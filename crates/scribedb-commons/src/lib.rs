//! # scribedb-commons
//!
//! Shared models and helpers for ScribeDB.
//!
//! This crate holds everything the other crates agree on:
//! - Type-safe identifier wrappers (`IndexName`, `RecordId`, `JobId`, ...)
//! - The index schema model (fields, sorters, stop words) and its validation
//! - The change state passed from the write path to live views
//! - The background job entity
//! - Sort helpers shared by the index engine and the view layer
//! - The store configuration and its key-layout helpers

pub mod config;
pub mod models;
pub mod validation;

pub use config::Config;
pub use models::change::{ChangeAction, ChangeState, IdxData};
pub use models::ids::{IndexName, JobId, RecordId, SearchId, SubscriberId};
pub use models::job::Job;
pub use models::schema::{FieldDefinition, IndexSchema, SorterDefinition};
pub use models::sort;
pub use models::sort::{compare_sort_pairs, compare_sort_values, SortDir, SortPair};
pub use validation::ValidationError;
