//! Error types for the live query engine.

use scribedb_index::IndexError;
use scribedb_store::StoreError;
use thiserror::Error;

/// Errors that can occur in live query operations
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for live query operations
pub type Result<T> = std::result::Result<T, LiveError>;

impl From<IndexError> for LiveError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidQuery(msg) => LiveError::InvalidQuery(msg),
            IndexError::NotFound(msg) => LiveError::NotFound(msg),
            IndexError::Storage(err) => LiveError::Storage(err.to_string()),
        }
    }
}

impl From<StoreError> for LiveError {
    fn from(err: StoreError) -> Self {
        LiveError::Storage(err.to_string())
    }
}
