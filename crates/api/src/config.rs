//! Server configuration, read once at startup.

use std::time::Duration;

use autoblog_jobs::EngineConfig;
use autoblog_jobs::config::parse_var;
use autoblog_pipelines::RateLimitConfig;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub engine: EngineConfig,
    pub rate_limit: RateLimitConfig,
    /// Simulated latency of each dry-run collaborator call.
    pub dry_run_latency: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            engine: EngineConfig::default(),
            rate_limit: RateLimitConfig::default(),
            dry_run_latency: Duration::ZERO,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let lookup = |key: &str| std::env::var(key).ok();
        Self {
            bind_addr: lookup("AUTOBLOG_BIND_ADDR").unwrap_or_else(|| {
                tracing::warn!("AUTOBLOG_BIND_ADDR not set; using {DEFAULT_BIND_ADDR}");
                DEFAULT_BIND_ADDR.to_string()
            }),
            engine: EngineConfig::from_lookup(lookup),
            rate_limit: RateLimitConfig::from_lookup(lookup),
            dry_run_latency: Duration::from_millis(parse_var(
                &lookup,
                "AUTOBLOG_DRY_RUN_LATENCY_MS",
                0,
            )),
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_dry_run_latency(mut self, latency: Duration) -> Self {
        self.dry_run_latency = latency;
        self
    }
}
