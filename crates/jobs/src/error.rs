//! Errors returned synchronously by the orchestrator.

use autoblog_core::{JobId, JobStatus};
use thiserror::Error;

use crate::store::JobStoreError;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// The referenced job does not exist.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The operation is not valid for the job's current status.
    #[error("cannot {action} job {id} while it is {status}")]
    InvalidState {
        id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    /// The engine is shutting down and no longer admits jobs.
    #[error("job engine is shut down")]
    ShutDown,

    #[error(transparent)]
    Store(JobStoreError),
}

impl From<JobStoreError> for JobError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => JobError::NotFound(id),
            other => JobError::Store(other),
        }
    }
}
