//! Core job records, log entries and the mutations applied to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoblog_core::{DomainError, JobId, JobStatus, JobType};

/// `maxRetries` recorded on a job when the submitter does not give one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A background job.
///
/// `max_retries` is informational: retrying creates a new record through
/// [`Job::resubmission`] and never resets this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Pipeline kind
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Opaque input handed to the pipeline unmodified
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub max_retries: u32,
    /// The failed job this one was resubmitted from.
    pub retry_of: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Present only when `status == failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only when `status == completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            payload,
            status: JobStatus::Pending,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_of: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// A fresh pending job carrying this job's type, payload and `max_retries`.
    pub fn resubmission(&self) -> Self {
        let mut job = Job::new(self.job_type.clone(), self.payload.clone()).with_max_retries(self.max_retries);
        job.retry_of = Some(self.id);
        job
    }

    /// Apply a lifecycle mutation at `at`.
    ///
    /// `started_at` is only ever written on entering `running` and
    /// `finished_at` only on entering a terminal state. A rejected mutation
    /// leaves the job untouched.
    pub fn apply(&mut self, mutation: JobMutation, at: DateTime<Utc>) -> Result<(), DomainError> {
        let next = match &mutation {
            // Passes through running within the same step.
            JobMutation::Reject { .. } => self
                .status
                .transition(JobStatus::Running)?
                .transition(JobStatus::Failed)?,
            other => self.status.transition(other.target())?,
        };
        // Never let a skewed clock put finished_at before started_at.
        let at = self.started_at.map_or(at, |started| at.max(started));

        match mutation {
            JobMutation::Start => {
                self.started_at = Some(at);
            }
            JobMutation::Complete { result } => {
                self.result = Some(result);
                self.finished_at = Some(at);
            }
            JobMutation::Fail { error } => {
                self.error = Some(error);
                self.finished_at = Some(at);
            }
            JobMutation::Cancel => {
                self.finished_at = Some(at);
            }
            JobMutation::Reject { error } => {
                self.started_at = Some(at);
                self.error = Some(error);
                self.finished_at = Some(at);
            }
        }

        self.status = next;
        Ok(())
    }

    /// Wall-clock run time, once both ends are known.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_milliseconds()),
            _ => None,
        }
    }
}

/// A state-machine step applied atomically by the job store.
#[derive(Debug, Clone, PartialEq)]
pub enum JobMutation {
    /// pending → running
    Start,
    /// running → completed
    Complete { result: serde_json::Value },
    /// running → failed
    Fail { error: String },
    /// pending|running → cancelled
    Cancel,
    /// pending → running → failed in one step, for jobs that can never run.
    Reject { error: String },
}

impl JobMutation {
    pub fn target(&self) -> JobStatus {
        match self {
            JobMutation::Start => JobStatus::Running,
            JobMutation::Complete { .. } => JobStatus::Completed,
            JobMutation::Fail { .. } => JobStatus::Failed,
            JobMutation::Cancel => JobStatus::Cancelled,
            JobMutation::Reject { .. } => JobStatus::Failed,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        JobMutation::Fail {
            error: error.into(),
        }
    }
}

/// Severity of a job log line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line of a job's user-visible execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Structured detail (step name, elapsed time, result, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(job_id: JobId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Listing filter; absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| s == job.status)
            && self.job_type.as_ref().is_none_or(|t| *t == job.job_type)
    }
}
