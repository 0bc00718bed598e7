//! Background job entity.
//!
//! Represents one long-running admin operation (reindex, bulk load, index
//! deletion) with coarse progress. At most one mutating job may exist per
//! index; the admin path enforces that gate before creating one.

use crate::models::ids::{IndexName, JobId};
use serde::{Deserialize, Serialize};

/// One tracked background operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub index: IndexName,
    pub title: String,
    /// Unix timestamp in milliseconds when the job was created.
    pub start: i64,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
}

impl Job {
    pub fn new(id: JobId, index: IndexName, title: impl Into<String>) -> Self {
        Self {
            id,
            index,
            title: title.into(),
            start: chrono::Utc::now().timestamp_millis(),
            progress: 0.0,
        }
    }

    /// Elapsed wall time in milliseconds since the job started.
    pub fn elapsed_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_starts_at_zero_progress() {
        let job = Job::new(JobId::new("job_1"), IndexName::new("myapp"), "reindex");
        assert_eq!(job.progress, 0.0);
        assert!(job.start > 0);
        assert_eq!(job.title, "reindex");
    }

    #[test]
    fn test_job_serialization() {
        let job = Job::new(JobId::new("job_1"), IndexName::new("myapp"), "add field");
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(job, back);
    }
}
