//! Single-step pipelines: one collaborator call per job.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use autoblog_jobs::{Pipeline, PipelineContext, PipelineError, PipelineOutput};
use serde_json::{Value, json};

use crate::collaborators::{
    CollaboratorResult, ContentFinisher, ContentGenerator, ImageGenerator, Publisher,
    TopicGenerator,
};

/// A pipeline step bound to the collaborator that performs it.
#[derive(Clone)]
pub enum Step {
    Topics(Arc<dyn TopicGenerator>),
    Content(Arc<dyn ContentGenerator>),
    Finishing(Arc<dyn ContentFinisher>),
    Images(Arc<dyn ImageGenerator>),
    Publish(Arc<dyn Publisher>),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Topics(_) => "topic generation",
            Step::Content(_) => "content generation",
            Step::Finishing(_) => "finishing",
            Step::Images(_) => "image generation",
            Step::Publish(_) => "publish",
        }
    }

    async fn call(&self, input: &Value) -> CollaboratorResult {
        match self {
            Step::Topics(c) => c.generate_topics(input).await,
            Step::Content(c) => c.generate_content(input).await,
            Step::Finishing(c) => c.finish(input).await,
            Step::Images(c) => c.generate_images(input).await,
            Step::Publish(c) => c.publish(input).await,
        }
    }

    /// Run the step for a job: checkpoint, call, and log start, end and elapsed time.
    pub async fn run(&self, ctx: &PipelineContext, input: &Value) -> Result<Value, PipelineError> {
        ctx.checkpoint()?;

        let step = self.name();
        ctx.logger.info_with(format!("Step started: {step}"), json!({ "step": step }));
        let started = Instant::now();

        let outcome = self.call(input).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(output) => {
                ctx.logger.info_with(
                    format!("Step finished: {step}"),
                    json!({ "step": step, "elapsedMs": elapsed_ms }),
                );
                Ok(output)
            }
            Err(err) => {
                ctx.logger.error_with(
                    format!("Step failed: {step}: {err}"),
                    json!({ "step": step, "elapsedMs": elapsed_ms }),
                );
                Err(err.into())
            }
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Step").field(&self.name()).finish()
    }
}

/// Runs exactly one step on the job's payload and returns its output.
#[derive(Debug, Clone)]
pub struct StepPipeline {
    step: Step,
}

impl StepPipeline {
    pub fn new(step: Step) -> Self {
        Self { step }
    }
}

#[async_trait]
impl Pipeline for StepPipeline {
    async fn run(&self, ctx: PipelineContext) -> PipelineOutput {
        self.step.run(&ctx, &ctx.payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollaboratorError;
    use autoblog_jobs::{InMemoryJobStore, Job, JobLogger, JobStore, JobType};
    use tokio_util::sync::CancellationToken;

    struct Echo;

    #[async_trait]
    impl Publisher for Echo {
        async fn publish(&self, payload: &Value) -> CollaboratorResult {
            Ok(json!({ "url": format!("https://blog.example/{}", payload["slug"].as_str().unwrap_or("post")) }))
        }
    }

    struct Down;

    #[async_trait]
    impl Publisher for Down {
        async fn publish(&self, _payload: &Value) -> CollaboratorResult {
            Err(CollaboratorError::Upstream(anyhow::anyhow!("blogger returned 503")))
        }
    }

    fn ctx(
        payload: Value,
        token: CancellationToken,
    ) -> (Arc<dyn JobStore>, PipelineContext) {
        let store = InMemoryJobStore::shared();
        let job = Job::new(JobType::Publish, payload.clone());
        let job_id = store.insert(job).unwrap();
        let ctx = PipelineContext {
            job_id,
            job_type: JobType::Publish,
            payload,
            cancellation: token,
            logger: JobLogger::new(job_id, store.clone()),
        };
        (store, ctx)
    }

    #[tokio::test]
    async fn step_returns_collaborator_output_and_logs_timing() {
        let (store, ctx) = ctx(json!({"slug": "hello"}), CancellationToken::new());
        let pipeline = StepPipeline::new(Step::Publish(Arc::new(Echo)));

        let out = pipeline.run(ctx.clone()).await.unwrap();
        assert_eq!(out["url"], "https://blog.example/hello");

        let logs = store.logs(ctx.job_id).unwrap();
        assert_eq!(logs[0].message, "Step started: publish");
        assert_eq!(logs[1].message, "Step finished: publish");
        assert!(logs[1].detail.as_ref().unwrap()["elapsedMs"].is_u64());
    }

    #[tokio::test]
    async fn collaborator_failure_fails_the_step() {
        let (store, ctx) = ctx(json!({}), CancellationToken::new());
        let pipeline = StepPipeline::new(Step::Publish(Arc::new(Down)));

        let err = pipeline.run(ctx.clone()).await.unwrap_err();
        assert_eq!(err.to_string(), "blogger returned 503");
        let logs = store.logs(ctx.job_id).unwrap();
        assert_eq!(logs.last().unwrap().message, "Step failed: publish: blogger returned 503");
    }

    #[tokio::test]
    async fn cancelled_step_never_calls_out() {
        let token = CancellationToken::new();
        token.cancel();
        let (store, ctx) = ctx(json!({}), token);
        let pipeline = StepPipeline::new(Step::Publish(Arc::new(Down)));

        assert!(matches!(pipeline.run(ctx.clone()).await, Err(PipelineError::Cancelled)));
        assert!(store.logs(ctx.job_id).unwrap().iter().all(|l| !l.message.starts_with("Step")));
    }
}
