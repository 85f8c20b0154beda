//! Public façade over the job store and worker pool.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use autoblog_core::{JobId, JobStatus, JobType};

use crate::config::EngineConfig;
use crate::error::{JobError, JobResult};
use crate::logger::JobLogger;
use crate::pool::{PoolStats, WorkerPool, WorkerPoolConfig};
use crate::registry::PipelineRegistry;
use crate::store::{JobStats, JobStoreError, SharedJobStore};
use crate::types::{Job, JobFilter, JobMutation, LogEntry, LogLevel};

/// Accepts jobs, answers queries about them and controls their lifecycle.
///
/// Every method returns without waiting on job execution; outcomes are
/// observed through [`JobOrchestrator::get`] and [`JobOrchestrator::logs`].
pub struct JobOrchestrator {
    store: SharedJobStore,
    pool: WorkerPool,
    config: EngineConfig,
}

impl JobOrchestrator {
    /// Start the engine. Must be called from within a tokio runtime.
    pub fn new(store: SharedJobStore, registry: PipelineRegistry, config: EngineConfig) -> Self {
        let pool = WorkerPool::spawn(
            store.clone(),
            Arc::new(registry),
            WorkerPoolConfig::default().with_max_concurrency(config.max_concurrency),
        );

        Self {
            store,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedJobStore {
        &self.store
    }

    /// Create a pending job and queue it for execution.
    pub fn submit(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        max_retries: Option<u32>,
    ) -> JobResult<Job> {
        let job = Job::new(job_type, payload)
            .with_max_retries(max_retries.unwrap_or(self.config.default_max_retries));
        let job_id = self.record(&job)?;
        self.dispatch(job_id)?;
        Ok(job)
    }

    /// Resubmit a failed job's input as a brand-new job.
    ///
    /// The failed job is left exactly as it was.
    pub fn retry(&self, job_id: JobId) -> JobResult<Job> {
        let original = self.store.get(job_id)?;
        if original.status != JobStatus::Failed {
            return Err(JobError::InvalidState {
                id: job_id,
                status: original.status,
                action: "retry",
            });
        }

        let job = original.resubmission();
        let new_id = self.record(&job)?;
        JobLogger::new(new_id, self.store.clone()).info(format!("Retry of job {job_id}"));
        self.dispatch(new_id)?;
        info!(job_id = %new_id, retry_of = %job_id, "job resubmitted");
        Ok(job)
    }

    fn record(&self, job: &Job) -> JobResult<JobId> {
        if self.pool.is_shut_down() {
            return Err(JobError::ShutDown);
        }

        let job_id = self.store.insert(job.clone())?;
        JobLogger::new(job_id, self.store.clone())
            .info_with(format!("Job created: {}", job.job_type), job.payload.clone());
        info!(job_id = %job_id, job_type = %job.job_type, "job submitted");
        Ok(job_id)
    }

    /// Hand a recorded job to the pool, removing the record if the pool
    /// stopped in the meantime.
    fn dispatch(&self, job_id: JobId) -> JobResult<()> {
        if let Err(err) = self.pool.enqueue(job_id) {
            self.store.delete(job_id);
            debug!(job_id = %job_id, error = %err, "discarded job the pool refused");
            return Err(err);
        }
        Ok(())
    }

    /// Cancel a pending or running job.
    ///
    /// A pending job is never started. A running job is marked `cancelled`
    /// immediately and its pipeline is signalled to stop at its next
    /// checkpoint. Returns `false` for terminal or unknown jobs.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let logger = JobLogger::new(job_id, self.store.clone());
        match logger.transition(JobMutation::Cancel, LogLevel::Info, "Job cancelled", None) {
            Ok(job) => {
                let signalled = self.pool.signal_cancel(job_id);
                info!(
                    job_id = %job_id,
                    was_running = job.started_at.is_some(),
                    signalled,
                    "job cancelled"
                );
                true
            }
            Err(err) => {
                debug!(job_id = %job_id, error = %err, "cancel refused");
                false
            }
        }
    }

    /// Remove a job and its logs. Running jobs must be cancelled first.
    pub fn delete(&self, job_id: JobId) -> JobResult<bool> {
        match self.store.delete_idle(job_id) {
            Ok(Some(job)) => {
                self.pool.signal_cancel(job_id);
                info!(job_id = %job_id, status = %job.status, "job deleted");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(JobStoreError::Busy { id, status }) => Err(JobError::InvalidState {
                id,
                status,
                action: "delete",
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn query(&self, filter: &JobFilter) -> Vec<Job> {
        self.store.list(filter)
    }

    pub fn get(&self, job_id: JobId) -> JobResult<Job> {
        Ok(self.store.get(job_id)?)
    }

    pub fn logs(&self, job_id: JobId) -> JobResult<Vec<LogEntry>> {
        Ok(self.store.logs(job_id)?)
    }

    pub fn stats(&self) -> JobStats {
        self.store.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Delete terminal jobs that finished more than `retention_days` ago.
    pub fn cleanup(&self, retention_days: u32) -> usize {
        let cutoff = chrono::Duration::try_days(i64::from(retention_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let purged = self.store.purge_older_than(cutoff);
        info!(retention_days, purged, "cleaned up old jobs");
        purged
    }

    /// Stop admitting jobs and cancel running ones, waiting up to the
    /// configured grace period for their pipelines to return.
    pub async fn shutdown(&self) {
        info!("shutting down job engine");
        self.pool.shutdown(self.config.shutdown_grace).await;
    }
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
