//! Per-job execution log.
//!
//! The job log is what users see on the jobs page. Every line is also
//! mirrored into `tracing` so operators get it in the process log.

use autoblog_core::JobId;
use tracing::{debug, error, info, warn};

use crate::store::{JobStoreError, SharedJobStore};
use crate::types::{Job, JobMutation, LogEntry, LogLevel};

/// Clonable handle that appends to a single job's log.
#[derive(Clone)]
pub struct JobLogger {
    job_id: JobId,
    store: SharedJobStore,
}

impl std::fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLogger")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl JobLogger {
    pub fn new(job_id: JobId, store: SharedJobStore) -> Self {
        Self { job_id, store }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Append a line. A job deleted mid-run silently drops its remaining lines.
    pub fn append(&self, level: LogLevel, message: impl Into<String>, detail: Option<serde_json::Value>) {
        let entry = self.entry(level, message.into(), detail);
        mirror(&entry);

        if let Err(JobStoreError::NotFound(_)) = self.store.append_log(self.job_id, entry) {
            debug!(job_id = %self.job_id, "dropping log line for deleted job");
        }
    }

    /// Apply `mutation` and record the line announcing it in one store step.
    ///
    /// Nothing is logged when the mutation is refused.
    pub fn transition(
        &self,
        mutation: JobMutation,
        level: LogLevel,
        message: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Result<Job, JobStoreError> {
        let entry = self.entry(level, message.into(), detail);
        let job = self.store.update_logged(self.job_id, mutation, entry.clone())?;
        mirror(&entry);
        Ok(job)
    }

    fn entry(&self, level: LogLevel, message: String, detail: Option<serde_json::Value>) -> LogEntry {
        let mut entry = LogEntry::new(self.job_id, level, message);
        entry.detail = detail;
        entry
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.append(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.append(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(LogLevel::Error, message, None);
    }

    pub fn info_with(&self, message: impl Into<String>, detail: serde_json::Value) {
        self.append(LogLevel::Info, message, Some(detail));
    }

    pub fn warn_with(&self, message: impl Into<String>, detail: serde_json::Value) {
        self.append(LogLevel::Warn, message, Some(detail));
    }

    pub fn error_with(&self, message: impl Into<String>, detail: serde_json::Value) {
        self.append(LogLevel::Error, message, Some(detail));
    }
}

fn mirror(entry: &LogEntry) {
    let (job_id, message) = (entry.job_id, &entry.message);
    match entry.level {
        LogLevel::Debug => debug!(job_id = %job_id, "{message}"),
        LogLevel::Info => info!(job_id = %job_id, "{message}"),
        LogLevel::Warn => warn!(job_id = %job_id, "{message}"),
        LogLevel::Error => error!(job_id = %job_id, "{message}"),
    }
}
