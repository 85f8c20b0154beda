use std::sync::Arc;
use std::time::{Duration, Instant};

use autoblog_jobs::{
    EngineConfig, InMemoryJobStore, Job, JobId, JobOrchestrator, JobStatus, JobType,
    PipelineRegistry,
};
use autoblog_pipelines::{DryRun, RateLimitConfig, RateLimiter, register_pipelines};
use serde_json::json;

fn engine(collaborators: autoblog_pipelines::Collaborators) -> JobOrchestrator {
    let mut registry = PipelineRegistry::new();
    register_pipelines(&mut registry, &collaborators);
    JobOrchestrator::new(InMemoryJobStore::shared(), registry, EngineConfig::default())
}

async fn finished(engine: &JobOrchestrator, id: JobId) -> Job {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = engine.get(id).unwrap();
        if job.status.is_terminal() {
            return job;
        }
        assert!(Instant::now() < deadline, "job {id} still {}", job.status);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn composite_job_publishes_a_post() {
    let engine = engine(DryRun::new().collaborators());

    let job = engine
        .submit(
            JobType::CompositePipeline,
            json!({"keyword": "sourdough", "finishing": true, "imageCount": 2, "platform": "tistory"}),
            None,
        )
        .unwrap();
    let job = finished(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let result = job.result.unwrap();
    assert_eq!(result["topic"]["selected"], "sourdough: a practical guide");
    assert_eq!(result["content"]["finished"], true);
    assert_eq!(result["images"]["urls"].as_array().unwrap().len(), 2);
    assert_eq!(
        result["published"]["url"],
        "dry-run://tistory/sourdough-a-practical-guide"
    );

    let steps: Vec<_> = engine
        .logs(job.id)
        .unwrap()
        .into_iter()
        .filter(|l| l.message.starts_with("Step finished"))
        .map(|l| l.message)
        .collect();
    assert_eq!(
        steps,
        vec![
            "Step finished: topic generation",
            "Step finished: content generation",
            "Step finished: finishing",
            "Step finished: image generation",
            "Step finished: publish",
        ]
    );
}

#[tokio::test]
async fn invalid_payload_fails_the_job() {
    let engine = engine(DryRun::new().collaborators());

    let job = engine.submit(JobType::TopicGeneration, json!({}), None).unwrap();
    let job = finished(&engine, job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("invalid payload: keyword is required"));
}

#[tokio::test]
async fn exhausted_budget_fails_the_job_with_a_rate_limit_error() {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitConfig::default()
            .with_max_requests(1)
            .with_min_interval(Duration::ZERO),
    ));
    let engine = engine(DryRun::new().collaborators().rate_limited(limiter));

    let first = engine
        .submit(JobType::TopicGeneration, json!({"keyword": "rust"}), None)
        .unwrap();
    assert_eq!(finished(&engine, first.id).await.status, JobStatus::Completed);

    let second = engine
        .submit(JobType::TopicGeneration, json!({"keyword": "rust"}), None)
        .unwrap();
    let second = finished(&engine, second.id).await;

    assert_eq!(second.status, JobStatus::Failed);
    assert!(
        second
            .error
            .as_deref()
            .unwrap()
            .starts_with("Rate limit exceeded for topics.")
    );
}
