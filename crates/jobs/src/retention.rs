//! Periodic retention purge.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::JobOrchestrator;

/// Handle to a background task that runs `cleanup` on a fixed period.
#[derive(Debug)]
pub struct RetentionSweeper {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl RetentionSweeper {
    /// Start sweeping. The first sweep runs immediately.
    pub fn spawn(orchestrator: Arc<JobOrchestrator>, retention_days: u32, interval: Duration) -> Self {
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let join = tokio::spawn(async move {
            info!(retention_days, interval_secs = interval.as_secs(), "retention sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = orchestrator.cleanup(retention_days);
                        debug!(purged, "retention sweep finished");
                    }
                }
            }

            info!("retention sweeper stopped");
        });

        Self { stop, join }
    }

    pub async fn shutdown(self) {
        self.stop.cancel();
        if let Err(err) = self.join.await {
            warn!(error = %err, "retention sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::registry::PipelineRegistry;
    use crate::store::InMemoryJobStore;
    use crate::types::{Job, JobMutation};
    use autoblog_core::JobType;

    #[tokio::test]
    async fn sweeps_expired_jobs_until_stopped() {
        let store = InMemoryJobStore::shared();
        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            PipelineRegistry::new(),
            EngineConfig::default(),
        ));

        let finished = store.insert(Job::new(JobType::Publish, serde_json::json!({}))).unwrap();
        store.update(finished, JobMutation::Cancel).unwrap();
        let waiting = store.insert(Job::new(JobType::Publish, serde_json::json!({}))).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let sweeper = RetentionSweeper::spawn(orchestrator.clone(), 0, Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get(finished).is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        sweeper.shutdown().await;
        assert!(store.get(waiting).is_ok());
        orchestrator.shutdown().await;
    }
}
