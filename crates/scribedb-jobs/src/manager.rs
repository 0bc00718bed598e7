//! Job manager: create, progress, finish, and shutdown draining.

use crate::error::{JobError, Result};
use dashmap::DashMap;
use scribedb_commons::{IndexName, Job, JobId};
use std::time::Duration;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Process-wide registry of running background jobs.
#[derive(Default)]
pub struct JobManager {
    jobs: DashMap<JobId, Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a job id and records the job with zero progress.
    pub fn create(&self, index: IndexName, title: impl Into<String>) -> JobId {
        let id = JobId::new(format!("job_{}", uuid::Uuid::new_v4().simple()));
        let job = Job::new(id.clone(), index, title);
        log::debug!("job {} started: {}", id, job.title);
        self.jobs.insert(id.clone(), job);
        id
    }

    /// Updates a job's progress (clamped to `[0, 1]`).
    ///
    /// A missing id logs an error and is a no-op: the job may have been
    /// finished by a racing completion path.
    pub fn update_progress(&self, id: &JobId, progress: f64) {
        match self.jobs.get_mut(id) {
            Some(mut job) => job.progress = progress.clamp(0.0, 1.0),
            None => log::error!("job {} not found for progress update", id),
        }
    }

    /// Removes the job and logs its completion record.
    pub fn finish(&self, id: &JobId) {
        match self.jobs.remove(id) {
            Some((_, job)) => {
                log::info!(
                    "job {} finished: {} (index={}, elapsed={}ms)",
                    id,
                    job.title,
                    job.index,
                    job.elapsed_ms()
                );
            }
            None => log::error!("job {} not found for finish", id),
        }
    }

    /// Number of jobs currently running against `index`.
    pub fn count_for(&self, index: &IndexName) -> usize {
        self.jobs.iter().filter(|job| job.index == *index).count()
    }

    /// The gate used by mutating admin operations: errors while any job is
    /// running against the index.
    pub fn ensure_idle(&self, index: &IndexName) -> Result<()> {
        if self.count_for(index) > 0 {
            return Err(JobError::AlreadyRunning(index.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .get(id)
            .map(|job| job.clone())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Snapshot of all running jobs.
    pub fn all(&self) -> Vec<Job> {
        self.jobs.iter().map(|job| job.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Polls until every job has finished. Used during shutdown.
    pub async fn wait_for_all(&self) {
        while !self.jobs.is_empty() {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_finish() {
        let manager = JobManager::new();
        let index = IndexName::new("myapp");

        let id = manager.create(index.clone(), "reindex");
        assert_eq!(manager.count_for(&index), 1);
        assert!(manager.ensure_idle(&index).is_err());

        let job = manager.get(&id).unwrap();
        assert_eq!(job.progress, 0.0);

        manager.finish(&id);
        assert_eq!(manager.count_for(&index), 0);
        assert!(manager.ensure_idle(&index).is_ok());
        assert!(matches!(manager.get(&id), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_progress_clamps_and_tolerates_missing() {
        let manager = JobManager::new();
        let id = manager.create(IndexName::new("myapp"), "add field");

        manager.update_progress(&id, 1.5);
        assert_eq!(manager.get(&id).unwrap().progress, 1.0);

        manager.update_progress(&id, -0.1);
        assert_eq!(manager.get(&id).unwrap().progress, 0.0);

        // Missing id: logged, no panic.
        manager.update_progress(&JobId::new("job_missing"), 0.5);
        manager.finish(&JobId::new("job_missing"));
    }

    #[test]
    fn test_count_for_is_per_index() {
        let manager = JobManager::new();
        let _a = manager.create(IndexName::new("a"), "one");
        let _b = manager.create(IndexName::new("b"), "two");
        assert_eq!(manager.count_for(&IndexName::new("a")), 1);
        assert_eq!(manager.count_for(&IndexName::new("b")), 1);
        assert_eq!(manager.count_for(&IndexName::new("c")), 0);
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_all() {
        let manager = std::sync::Arc::new(JobManager::new());
        let id = manager.create(IndexName::new("myapp"), "slow");

        let finisher = std::sync::Arc::clone(&manager);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            finisher.finish(&id);
        });

        manager.wait_for_all().await;
        assert!(manager.is_empty());
    }
}
