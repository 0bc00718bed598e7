use thiserror::Error;

/// Errors that can occur in job operations
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job already running for index: {0}")]
    AlreadyRunning(String),
}

/// Result type for job operations
pub type Result<T> = std::result::Result<T, JobError>;
