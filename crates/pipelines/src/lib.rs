//! Content pipelines run by the job engine.
//!
//! Each job type maps to a pipeline built from collaborator calls. The
//! collaborators themselves (AI models, blog platforms) sit behind traits so
//! the server can run against real clients or the [`DryRun`] stand-ins.

pub mod collaborators;
pub mod composite;
pub mod dry_run;
pub mod ratelimit;
pub mod steps;

use std::sync::Arc;

use autoblog_core::JobType;
use autoblog_jobs::PipelineRegistry;

pub use collaborators::{
    CollaboratorError, CollaboratorResult, Collaborators, ContentFinisher, ContentGenerator,
    ImageGenerator, Publisher, TopicGenerator,
};
pub use composite::CompositePipeline;
pub use dry_run::DryRun;
pub use ratelimit::{RateLimitConfig, RateLimited, RateLimiter};
pub use steps::{Step, StepPipeline};

impl Collaborators {
    /// Route every collaborator through `limiter`, one budget per role.
    pub fn rate_limited(self, limiter: Arc<RateLimiter>) -> Self {
        Self {
            topics: Arc::new(RateLimited::new(self.topics, "topics", limiter.clone())),
            content: Arc::new(RateLimited::new(self.content, "content", limiter.clone())),
            finisher: Arc::new(RateLimited::new(self.finisher, "finishing", limiter.clone())),
            images: Arc::new(RateLimited::new(self.images, "images", limiter.clone())),
            publisher: Arc::new(RateLimited::new(self.publisher, "publish", limiter)),
        }
    }
}

/// Register a pipeline for every job type.
pub fn register_pipelines(registry: &mut PipelineRegistry, collaborators: &Collaborators) {
    let c = collaborators;
    registry
        .register(JobType::TopicGeneration, StepPipeline::new(Step::Topics(c.topics.clone())))
        .register(JobType::ContentGeneration, StepPipeline::new(Step::Content(c.content.clone())))
        .register(JobType::Finishing, StepPipeline::new(Step::Finishing(c.finisher.clone())))
        .register(JobType::ImageGeneration, StepPipeline::new(Step::Images(c.images.clone())))
        .register(JobType::Publish, StepPipeline::new(Step::Publish(c.publisher.clone())))
        .register(JobType::CompositePipeline, CompositePipeline::new(c.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_job_type_gets_a_pipeline() {
        let mut registry = PipelineRegistry::new();
        register_pipelines(&mut registry, &DryRun::new().collaborators());

        for job_type in JobType::ALL {
            assert!(registry.contains(&job_type), "{job_type} has no pipeline");
        }
    }
}
