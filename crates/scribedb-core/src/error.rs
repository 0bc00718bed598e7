//! Error types surfaced by the ScribeDB facade.

use scribedb_commons::ValidationError;
use scribedb_index::IndexError;
use scribedb_jobs::JobError;
use scribedb_live::LiveError;
use scribedb_store::StoreError;
use thiserror::Error;

/// Main error type for ScribeDB operations.
#[derive(Error, Debug)]
pub enum ScribeDbError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A mutating admin operation was attempted while a background job was
    /// running against the index.
    #[error("Index busy: {0}")]
    Busy(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// A caller-supplied update transform returned the abort sentinel.
    #[error("Update aborted by transform")]
    Aborted,

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for ScribeDB operations.
pub type Result<T> = std::result::Result<T, ScribeDbError>;

impl From<StoreError> for ScribeDbError {
    fn from(err: StoreError) -> Self {
        ScribeDbError::Storage(err.to_string())
    }
}

impl From<IndexError> for ScribeDbError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidQuery(msg) => ScribeDbError::InvalidQuery(msg),
            IndexError::NotFound(msg) => ScribeDbError::NotFound(msg),
            IndexError::Storage(err) => ScribeDbError::Storage(err.to_string()),
        }
    }
}

impl From<LiveError> for ScribeDbError {
    fn from(err: LiveError) -> Self {
        match err {
            LiveError::InvalidQuery(msg) => ScribeDbError::InvalidQuery(msg),
            LiveError::NotFound(msg) => ScribeDbError::NotFound(msg),
            LiveError::Storage(msg) => ScribeDbError::Storage(msg),
        }
    }
}

impl From<JobError> for ScribeDbError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::AlreadyRunning(index) => ScribeDbError::Busy(index),
            JobError::NotFound(msg) => ScribeDbError::NotFound(msg),
        }
    }
}

impl From<ValidationError> for ScribeDbError {
    fn from(err: ValidationError) -> Self {
        ScribeDbError::InvalidSchema(err.to_string())
    }
}
