//! Background job engine for the autoblog content pipeline.
//!
//! Long-running AI generation and publishing work is submitted as jobs and
//! executed asynchronously under a global concurrency limit. The
//! [`JobOrchestrator`] is the only entry point callers need:
//!
//! - jobs are created `pending`, admitted FIFO by the [`WorkerPool`], and end
//!   `completed`, `failed` or `cancelled`;
//! - each job carries an append-only execution log written through a
//!   [`JobLogger`];
//! - a failed job is retried by resubmitting its input as a new job;
//! - terminal jobs are purged after a retention window, on demand or by the
//!   [`RetentionSweeper`].
//!
//! Job types are bound to [`Pipeline`] implementations through a
//! [`PipelineRegistry`].

pub mod config;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod retention;
pub mod store;
pub mod types;

pub use config::{DEFAULT_MAX_CONCURRENCY, DEFAULT_RETENTION_DAYS, EngineConfig};
pub use error::{JobError, JobResult};
pub use logger::JobLogger;
pub use orchestrator::JobOrchestrator;
pub use pool::{PoolStats, WorkerPool, WorkerPoolConfig};
pub use registry::{Pipeline, PipelineContext, PipelineError, PipelineOutput, PipelineRegistry};
pub use retention::RetentionSweeper;
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError, SharedJobStore};
pub use types::{DEFAULT_MAX_RETRIES, Job, JobFilter, JobMutation, LogEntry, LogLevel};

pub use autoblog_core::{JobId, JobStatus, JobType};
