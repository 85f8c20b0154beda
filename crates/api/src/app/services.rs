use std::sync::Arc;

use autoblog_jobs::{InMemoryJobStore, JobOrchestrator, PipelineRegistry, RetentionSweeper};
use autoblog_pipelines::{DryRun, RateLimiter, register_pipelines};

use crate::config::ServerConfig;

/// Long-lived engine components owned by the server process.
#[derive(Debug)]
pub struct AppServices {
    pub orchestrator: Arc<JobOrchestrator>,
    pub sweeper: Option<RetentionSweeper>,
}

/// Wire the in-memory store, the rate-limited dry-run collaborators and the
/// engine. Must be called from within a tokio runtime.
pub fn build_services(config: &ServerConfig) -> AppServices {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let collaborators = DryRun::new()
        .with_latency(config.dry_run_latency)
        .collaborators()
        .rate_limited(limiter);

    let mut registry = PipelineRegistry::new();
    register_pipelines(&mut registry, &collaborators);

    let orchestrator = Arc::new(JobOrchestrator::new(
        InMemoryJobStore::shared(),
        registry,
        config.engine.clone(),
    ));

    let sweeper = config.engine.sweep_interval.map(|interval| {
        RetentionSweeper::spawn(orchestrator.clone(), config.engine.retention_days, interval)
    });
    if sweeper.is_none() {
        tracing::debug!("retention sweeper disabled");
    }

    AppServices {
        orchestrator,
        sweeper,
    }
}

impl AppServices {
    /// Stop the sweeper, then drain the engine.
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            sweeper.shutdown().await;
        }
        self.orchestrator.shutdown().await;
    }
}
