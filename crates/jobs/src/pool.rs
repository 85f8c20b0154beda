//! Worker pool: bounded, FIFO admission of pending jobs onto tokio tasks.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use autoblog_core::{JobId, JobStatus};

use crate::config::DEFAULT_MAX_CONCURRENCY;
use crate::error::{JobError, JobResult};
use crate::logger::JobLogger;
use crate::registry::{Pipeline, PipelineContext, PipelineError, PipelineRegistry};
use crate::store::{JobStoreError, SharedJobStore};
use crate::types::{Job, JobMutation, LogLevel};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of simultaneously running jobs
    pub max_concurrency: usize,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            name: "job-pool".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub max_concurrency: usize,
    pub running: usize,
    pub queued: usize,
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn record(&self, status: JobStatus) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            JobStatus::Completed => &self.succeeded,
            JobStatus::Failed => &self.failed,
            JobStatus::Cancelled => &self.cancelled,
            JobStatus::Pending | JobStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Shared {
    config: WorkerPoolConfig,
    store: SharedJobStore,
    registry: Arc<PipelineRegistry>,
    queue: Mutex<VecDeque<JobId>>,
    wakeup: Notify,
    slots: Arc<Semaphore>,
    /// Cancellation tokens of admitted jobs, keyed by id.
    running: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
    counters: Counters,
    started: Instant,
}

// Critical sections below never leave the guarded value half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs pending jobs on at most `max_concurrency` tokio tasks at a time.
///
/// Ids are admitted in the order they were enqueued. A job is moved to
/// `running` only once a slot is free, and the slot is held until its final
/// status has been recorded.
pub struct WorkerPool {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start the dispatcher task. Must be called from within a tokio runtime.
    pub fn spawn(
        store: SharedJobStore,
        registry: Arc<PipelineRegistry>,
        config: WorkerPoolConfig,
    ) -> Self {
        let config = WorkerPoolConfig {
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };
        let shared = Arc::new(Shared {
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            store,
            registry,
            queue: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            running: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            counters: Counters::default(),
            started: Instant::now(),
        });

        let dispatcher = tokio::spawn(dispatch_loop(Arc::clone(&shared)));

        Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Queue a pending job for admission.
    pub fn enqueue(&self, job_id: JobId) -> JobResult<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(JobError::ShutDown);
        }
        lock(&self.shared.queue).push_back(job_id);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Drop a job from the queue and signal its token if it is running.
    ///
    /// Returns whether a running pipeline was signalled. The job record
    /// itself is not touched.
    pub fn signal_cancel(&self, job_id: JobId) -> bool {
        lock(&self.shared.queue).retain(|queued| *queued != job_id);

        match lock(&self.shared.running).get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.config.max_concurrency
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let counters = &shared.counters;
        PoolStats {
            max_concurrency: shared.config.max_concurrency,
            running: lock(&shared.running).len(),
            queued: lock(&shared.queue).len(),
            jobs_processed: counters.processed.load(Ordering::Relaxed),
            jobs_succeeded: counters.succeeded.load(Ordering::Relaxed),
            jobs_failed: counters.failed.load(Ordering::Relaxed),
            jobs_cancelled: counters.cancelled.load(Ordering::Relaxed),
            uptime_secs: shared.started.elapsed().as_secs(),
        }
    }

    /// Stop admitting jobs, signal every running pipeline and wait up to
    /// `grace` for them to finish.
    ///
    /// Jobs still queued stay `pending`.
    pub async fn shutdown(&self, grace: Duration) {
        let shared = &self.shared;
        shared.shutdown.cancel();

        let dispatcher = lock(&self.dispatcher).take();
        if let Some(handle) = dispatcher {
            if let Err(err) = handle.await {
                error!(pool = %shared.config.name, error = %err, "dispatcher task failed");
            }
        }

        // Every slot back in hand means no pipeline task is left.
        let all_slots = u32::try_from(shared.config.max_concurrency).unwrap_or(u32::MAX);
        match tokio::time::timeout(grace, shared.slots.acquire_many(all_slots)).await {
            Ok(_) => info!(pool = %shared.config.name, "worker pool stopped"),
            Err(_) => warn!(
                pool = %shared.config.name,
                running = lock(&shared.running).len(),
                "worker pool stopped with jobs still running"
            ),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.config.name)
            .field("max_concurrency", &self.shared.config.max_concurrency)
            .finish_non_exhaustive()
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    info!(
        pool = %shared.config.name,
        max_concurrency = shared.config.max_concurrency,
        "worker pool started"
    );

    while let Some(job_id) = shared.next_queued().await {
        if !shared.admit(job_id).await {
            break;
        }
    }

    debug!(pool = %shared.config.name, "dispatcher stopped");
}

impl Shared {
    /// Oldest queued id, or `None` once the pool is shutting down.
    async fn next_queued(&self) -> Option<JobId> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            if let Some(job_id) = lock(&self.queue).pop_front() {
                return Some(job_id);
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = self.wakeup.notified() => {}
            }
        }
    }

    /// Admit one job. Returns `false` once the pool is shutting down.
    async fn admit(self: &Arc<Self>, job_id: JobId) -> bool {
        let job = match self.store.get(job_id) {
            Ok(job) if job.status == JobStatus::Pending => job,
            Ok(job) => {
                debug!(
                    pool = %self.config.name,
                    job_id = %job_id,
                    status = %job.status,
                    "skipping job that is no longer pending"
                );
                return true;
            }
            Err(_) => {
                debug!(pool = %self.config.name, job_id = %job_id, "skipping deleted job");
                return true;
            }
        };

        let Some(pipeline) = self.registry.get(&job.job_type) else {
            self.reject_unknown(&job);
            return true;
        };

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return false,
            permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        // Registered before Start so a cancel landing right after it finds the token.
        let token = self.shutdown.child_token();
        lock(&self.running).insert(job_id, token.clone());

        let logger = JobLogger::new(job_id, Arc::clone(&self.store));
        let started = logger.transition(
            JobMutation::Start,
            LogLevel::Info,
            format!("Executing job: {}", job.job_type),
            None,
        );
        let job = match started {
            Ok(job) => job,
            Err(err) => {
                lock(&self.running).remove(&job_id);
                debug!(
                    pool = %self.config.name,
                    job_id = %job_id,
                    error = %err,
                    "job left pending while waiting for a slot"
                );
                return true;
            }
        };

        debug!(pool = %self.config.name, job_id = %job_id, job_type = %job.job_type, "admitted job");

        let ctx = PipelineContext {
            job_id,
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            cancellation: token,
            logger,
        };
        tokio::spawn(Arc::clone(self).run(job, pipeline, ctx, permit));
        true
    }

    fn reject_unknown(&self, job: &Job) {
        let reason = format!("no pipeline registered for job type: {}", job.job_type);

        let rejected = JobLogger::new(job.id, Arc::clone(&self.store)).transition(
            JobMutation::Reject { error: reason },
            LogLevel::Error,
            format!("No pipeline registered for job type: {}", job.job_type),
            None,
        );
        match rejected {
            Ok(rejected) => {
                self.counters.record(rejected.status);
                warn!(
                    pool = %self.config.name,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    "no pipeline for job"
                );
            }
            Err(err) => debug!(
                pool = %self.config.name,
                job_id = %job.id,
                error = %err,
                "job changed before it could be rejected"
            ),
        }
    }

    async fn run(
        self: Arc<Self>,
        job: Job,
        pipeline: Arc<dyn Pipeline>,
        ctx: PipelineContext,
        permit: OwnedSemaphorePermit,
    ) {
        // Dropped in reverse order: the token entry goes first, then the slot.
        let _slot = permit;
        let _admitted = Admitted {
            shared: &self,
            job_id: job.id,
        };

        let logger = ctx.logger.clone();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(pipeline.run(ctx)).catch_unwind().await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mutation = match outcome {
            Ok(Ok(result)) => JobMutation::Complete { result },
            Ok(Err(PipelineError::Cancelled)) => JobMutation::Cancel,
            Ok(Err(PipelineError::Collaborator(source))) => {
                warn!(
                    pool = %self.config.name,
                    job_id = %job.id,
                    error = %format!("{source:#}"),
                    "collaborator call failed"
                );
                JobMutation::fail(source.to_string())
            }
            Ok(Err(err)) => JobMutation::fail(err.to_string()),
            Err(panic) => {
                let message = panic_message(&panic);
                error!(
                    pool = %self.config.name,
                    job_id = %job.id,
                    panic = %message,
                    "pipeline panicked"
                );
                JobMutation::fail(format!("internal error: pipeline panicked: {message}"))
            }
        };

        self.finish(&job, mutation, &logger, elapsed_ms);
    }

    fn finish(&self, job: &Job, mutation: JobMutation, logger: &JobLogger, elapsed_ms: u64) {
        let outcome = mutation.target();
        let (level, message, detail) = match &mutation {
            JobMutation::Complete { result } => (
                LogLevel::Info,
                "Job completed successfully".to_string(),
                Some(serde_json::json!({ "elapsedMs": elapsed_ms, "result": result })),
            ),
            JobMutation::Fail { error } | JobMutation::Reject { error } => (
                LogLevel::Error,
                format!("Job failed: {error}"),
                Some(serde_json::json!({ "elapsedMs": elapsed_ms })),
            ),
            JobMutation::Cancel | JobMutation::Start => {
                (LogLevel::Info, "Job cancelled".to_string(), None)
            }
        };

        match logger.transition(mutation, level, message, detail) {
            Ok(done) => {
                self.counters.record(done.status);
                debug!(
                    pool = %self.config.name,
                    job_id = %job.id,
                    status = %done.status,
                    elapsed_ms,
                    "job finished"
                );
            }
            // A cancel got there first; its verdict stands.
            Err(JobStoreError::InvalidTransition { .. }) => {
                if outcome == JobStatus::Cancelled {
                    logger.info("Pipeline stopped after cancellation");
                } else {
                    logger.info(format!("Discarded late {outcome} outcome of a cancelled job"));
                }
                debug!(
                    pool = %self.config.name,
                    job_id = %job.id,
                    outcome = %outcome,
                    "discarding pipeline outcome"
                );
            }
            Err(err) => debug!(
                pool = %self.config.name,
                job_id = %job.id,
                error = %err,
                "job removed before its outcome was recorded"
            ),
        }
    }
}

/// Forgets a job's cancellation token when its task ends, however it ends.
struct Admitted<'a> {
    shared: &'a Shared,
    job_id: JobId,
}

impl Drop for Admitted<'_> {
    fn drop(&mut self) {
        lock(&self.shared.running).remove(&self.job_id);
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
