//! Job storage: the authoritative job records and their execution logs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use autoblog_core::{DomainError, JobId, JobStatus};

use crate::types::{Job, JobFilter, JobMutation, LogEntry};

/// Shared handle to the store used by the orchestrator, pool and loggers.
pub type SharedJobStore = Arc<dyn JobStore>;

/// Job store abstraction.
///
/// Implementations must apply every mutation of a given job atomically and
/// hand out snapshots from reads, never live views.
pub trait JobStore: Send + Sync {
    /// Store a new job.
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// List matching jobs, newest-created first, capped at `filter.limit`.
    fn list(&self, filter: &JobFilter) -> Vec<Job>;

    /// Apply a lifecycle mutation and return the updated job.
    fn update(&self, job_id: JobId, mutation: JobMutation) -> Result<Job, JobStoreError>;

    /// Apply a lifecycle mutation and append `entry` in the same step.
    ///
    /// The line is appended only if the mutation applies, and is visible no
    /// later than the new status.
    fn update_logged(
        &self,
        job_id: JobId,
        mutation: JobMutation,
        entry: LogEntry,
    ) -> Result<Job, JobStoreError>;

    /// Remove a job and its logs. Returns whether the job existed.
    fn delete(&self, job_id: JobId) -> bool;

    /// Remove a job and its logs unless it is `running`, in one step.
    ///
    /// Returns the removed job, `None` if it did not exist, or
    /// [`JobStoreError::Busy`] if it was running.
    fn delete_idle(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Append a line to a job's log.
    fn append_log(&self, job_id: JobId, entry: LogEntry) -> Result<(), JobStoreError>;

    /// A job's log in append order.
    fn logs(&self, job_id: JobId) -> Result<Vec<LogEntry>, JobStoreError>;

    /// Delete every job that finished strictly before `cutoff`, with its logs.
    ///
    /// Jobs without `finished_at` are never purged.
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize;

    /// Get job statistics.
    fn stats(&self) -> JobStats;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {id}: {source}")]
    InvalidTransition {
        id: JobId,
        #[source]
        source: DomainError,
    },
    #[error("job {id} is {status}")]
    Busy { id: JobId, status: JobStatus },
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobStats {
    fn count(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    job: Job,
    logs: Vec<LogEntry>,
}

impl JobEntry {
    // Entries are ordered by append; keep timestamps monotonic with it.
    fn push_log(&mut self, mut entry: LogEntry) {
        if let Some(last) = self.logs.last() {
            if entry.timestamp < last.timestamp {
                entry.timestamp = last.timestamp;
            }
        }
        entry.job_id = self.job.id;
        self.logs.push(entry);
    }
}

/// In-memory job store.
///
/// One lock covers jobs and logs together, so deletes cascade atomically and
/// a late cancel can never interleave with a completion.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedJobStore {
        Arc::new(Self::new())
    }

    // Every critical section leaves the map consistent, so a panic elsewhere
    // while holding the lock does not invalidate the data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.write();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(
            id,
            JobEntry {
                job,
                logs: Vec::new(),
            },
        );
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        self.read()
            .get(&job_id)
            .map(|entry| entry.job.clone())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let jobs = self.read();
        let mut result: Vec<_> = jobs
            .values()
            .map(|entry| &entry.job)
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        drop(jobs);

        // Newest first; ids are time-ordered and break ties.
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        result
    }

    fn update(&self, job_id: JobId, mutation: JobMutation) -> Result<Job, JobStoreError> {
        let mut jobs = self.write();
        let entry = jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;

        entry
            .job
            .apply(mutation, Utc::now())
            .map_err(|source| JobStoreError::InvalidTransition { id: job_id, source })?;
        Ok(entry.job.clone())
    }

    fn update_logged(
        &self,
        job_id: JobId,
        mutation: JobMutation,
        entry: LogEntry,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.write();
        let target = jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;

        target
            .job
            .apply(mutation, Utc::now())
            .map_err(|source| JobStoreError::InvalidTransition { id: job_id, source })?;
        target.push_log(entry);
        Ok(target.job.clone())
    }

    fn delete(&self, job_id: JobId) -> bool {
        self.write().remove(&job_id).is_some()
    }

    fn delete_idle(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.write();
        match jobs.get(&job_id).map(|entry| entry.job.status) {
            None => Ok(None),
            Some(JobStatus::Running) => Err(JobStoreError::Busy {
                id: job_id,
                status: JobStatus::Running,
            }),
            Some(_) => Ok(jobs.remove(&job_id).map(|entry| entry.job)),
        }
    }

    fn append_log(&self, job_id: JobId, entry: LogEntry) -> Result<(), JobStoreError> {
        let mut jobs = self.write();
        jobs.get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?
            .push_log(entry);
        Ok(())
    }

    fn logs(&self, job_id: JobId) -> Result<Vec<LogEntry>, JobStoreError> {
        self.read()
            .get(&job_id)
            .map(|entry| entry.logs.clone())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, entry| entry.job.finished_at.is_none_or(|finished| finished >= cutoff));
        before - jobs.len()
    }

    fn stats(&self) -> JobStats {
        let jobs = self.read();
        let mut stats = JobStats::default();
        for entry in jobs.values() {
            stats.count(entry.job.status);
        }
        stats
    }
}
