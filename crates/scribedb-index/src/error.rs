//! Error types for the index engine.

use scribedb_store::StoreError;
use thiserror::Error;

/// Errors that can occur in index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
