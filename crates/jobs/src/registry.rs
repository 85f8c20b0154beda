//! Pipeline registry: maps each job type to the async function that runs it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use autoblog_core::{JobId, JobType};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::logger::JobLogger;

pub type PipelineOutput = Result<serde_json::Value, PipelineError>;

/// Error returned by a pipeline; recorded on the job, never surfaced to the submitter.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline observed its cancellation token and stopped.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    /// An external call failed; the chain is kept for the tracing log.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Everything a pipeline gets to see of its job.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub job_id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub cancellation: CancellationToken,
    pub logger: JobLogger,
}

impl PipelineContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Safe point between steps: bail out if cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancellation.is_cancelled() {
            self.logger.warn("Cancellation observed, stopping");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// A type-specific asynchronous operation that performs a job's work.
///
/// Implementations must call [`PipelineContext::checkpoint`] between external
/// calls; the engine never interrupts a pipeline on its own.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, ctx: PipelineContext) -> PipelineOutput;
}

struct FnPipeline<F>(F);

#[async_trait]
impl<F, Fut> Pipeline for FnPipeline<F>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync,
    Fut: Future<Output = PipelineOutput> + Send + 'static,
{
    async fn run(&self, ctx: PipelineContext) -> PipelineOutput {
        (self.0)(ctx).await
    }
}

/// Job type → pipeline mapping. Built once, then shared read-only.
#[derive(Default, Clone)]
pub struct PipelineRegistry {
    pipelines: HashMap<JobType, Arc<dyn Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the pipeline for a job type.
    pub fn register<P>(&mut self, job_type: JobType, pipeline: P) -> &mut Self
    where
        P: Pipeline + 'static,
    {
        self.pipelines.insert(job_type, Arc::new(pipeline));
        self
    }

    pub fn register_arc(&mut self, job_type: JobType, pipeline: Arc<dyn Pipeline>) -> &mut Self {
        self.pipelines.insert(job_type, pipeline);
        self
    }

    /// Register a plain async closure as a pipeline.
    pub fn register_fn<F, Fut>(&mut self, job_type: JobType, f: F) -> &mut Self
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineOutput> + Send + 'static,
    {
        self.register(job_type, FnPipeline(f))
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn Pipeline>> {
        self.pipelines.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.pipelines.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<_> = self.pipelines.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;

    fn ctx(token: CancellationToken) -> PipelineContext {
        let store = InMemoryJobStore::shared();
        let job_id = JobId::new();
        PipelineContext {
            job_id,
            job_type: JobType::Publish,
            payload: serde_json::json!({"title": "hello"}),
            cancellation: token,
            logger: JobLogger::new(job_id, store),
        }
    }

    #[tokio::test]
    async fn closures_run_as_pipelines() {
        let mut registry = PipelineRegistry::new();
        registry.register_fn(JobType::Publish, |ctx: PipelineContext| async move {
            Ok(serde_json::json!({"echo": ctx.payload["title"]}))
        });

        assert!(registry.contains(&JobType::Publish));
        assert!(registry.get(&JobType::Finishing).is_none());
        assert!(registry.get(&JobType::Other("podcast".into())).is_none());

        let pipeline = registry.get(&JobType::Publish).unwrap();
        let out = pipeline.run(ctx(CancellationToken::new())).await.unwrap();
        assert_eq!(out["echo"], "hello");
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let token = CancellationToken::new();
        let ctx = ctx(token.clone());
        assert!(ctx.checkpoint().is_ok());

        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn job_types_are_listed_in_stable_order() {
        let mut registry = PipelineRegistry::new();
        registry
            .register_fn(JobType::Publish, |_| async { Ok(serde_json::Value::Null) })
            .register_fn(JobType::Finishing, |_| async { Ok(serde_json::Value::Null) });

        assert_eq!(registry.job_types(), vec![JobType::Finishing, JobType::Publish]);
    }
}
