//! Engine configuration.

use std::time::Duration;

use tracing::warn;

use crate::types::DEFAULT_MAX_RETRIES;

/// Worker pool size used when nothing is configured.
///
/// Kept small: every running job drives paid, rate-limited AI calls.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Retention window (days) used by cleanup when the caller gives none.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// How long shutdown waits for running pipelines to honour cancellation.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of simultaneously running jobs (global, all types).
    pub max_concurrency: usize,
    /// `maxRetries` recorded on submissions that do not specify one.
    pub default_max_retries: u32,
    /// Retention window for cleanup and the sweeper.
    pub retention_days: u32,
    /// Period of the background retention sweeper; `None` disables it.
    pub sweep_interval: Option<Duration>,
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_max_retries: DEFAULT_MAX_RETRIES,
            retention_days: DEFAULT_RETENTION_DAYS,
            sweep_interval: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl EngineConfig {
    /// Read `AUTOBLOG_*` variables, keeping defaults for anything unset or invalid.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let sweep_secs: u64 = parse_var(&lookup, "AUTOBLOG_SWEEP_INTERVAL_SECS", 0);
        let grace_secs: u64 = parse_var(
            &lookup,
            "AUTOBLOG_SHUTDOWN_GRACE_SECS",
            defaults.shutdown_grace.as_secs(),
        );

        Self {
            max_concurrency: parse_var(&lookup, "AUTOBLOG_MAX_CONCURRENCY", defaults.max_concurrency)
                .max(1),
            default_max_retries: parse_var(
                &lookup,
                "AUTOBLOG_DEFAULT_MAX_RETRIES",
                defaults.default_max_retries,
            ),
            retention_days: parse_var(&lookup, "AUTOBLOG_RETENTION_DAYS", defaults.retention_days),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            shutdown_grace: Duration::from_secs(grace_secs),
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Parse an optional variable, warning (not failing) on garbage.
pub fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            let fallback = default.to_string();
            warn!(key, value = %raw, default = %fallback, "invalid configuration value; using default");
            default
        }),
    }
}
