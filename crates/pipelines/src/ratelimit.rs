//! Per-API request throttling for collaborator calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use autoblog_jobs::config::parse_var;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::collaborators::{
    CollaboratorError, CollaboratorResult, ContentFinisher, ContentGenerator, ImageGenerator,
    Publisher, TopicGenerator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window, per API.
    pub max_requests: u32,
    pub window: Duration,
    /// Minimum spacing between two requests to the same API.
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            min_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_requests: parse_var(&lookup, "AUTOBLOG_RATE_LIMIT_MAX_REQUESTS", defaults.max_requests)
                .max(1),
            window: Duration::from_secs(parse_var(
                &lookup,
                "AUTOBLOG_RATE_LIMIT_WINDOW_SECS",
                defaults.window.as_secs(),
            )),
            min_interval: Duration::from_millis(parse_var(
                &lookup,
                "AUTOBLOG_RATE_LIMIT_MIN_INTERVAL_MS",
                u64::try_from(defaults.min_interval.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests = max.max(1);
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

#[derive(Debug)]
struct ApiWindow {
    count: u32,
    resets_at: Instant,
    /// Earliest instant the next request may go out.
    next_slot: Instant,
}

/// Fixed-window limiter keyed by API name.
///
/// A request over the window budget fails fast with
/// [`CollaboratorError::RateLimited`]; a request inside the budget but too
/// close to the previous one waits out the remaining interval.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, ApiWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Reserve a request slot for `api`, sleeping for the minimum interval if needed.
    pub async fn acquire(&self, api: &str) -> Result<(), CollaboratorError> {
        let wait = self.reserve(api, Instant::now())?;
        if !wait.is_zero() {
            debug!(api, wait = ?wait, "spacing collaborator request");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    fn reserve(&self, api: &str, now: Instant) -> Result<Duration, CollaboratorError> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(api.to_string()).or_insert_with(|| ApiWindow {
            count: 0,
            resets_at: now + self.config.window,
            next_slot: now,
        });

        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + self.config.window;
        }

        if window.count >= self.config.max_requests {
            let retry_after = window.resets_at - now;
            warn!(api, retry_after = ?retry_after, "rate limit exceeded");
            return Err(CollaboratorError::RateLimited {
                api: api.to_string(),
                retry_after,
            });
        }

        window.count += 1;
        let slot = window.next_slot.max(now);
        window.next_slot = slot + self.config.min_interval;
        Ok(slot - now)
    }

    /// Forget the window of one API, or of all of them.
    pub fn reset(&self, api: Option<&str>) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match api {
            Some(api) => {
                windows.remove(api);
            }
            None => windows.clear(),
        }
    }
}

/// A collaborator whose every call goes through a shared [`RateLimiter`].
pub struct RateLimited<C> {
    inner: C,
    api: String,
    limiter: Arc<RateLimiter>,
}

impl<C> RateLimited<C> {
    pub fn new(inner: C, api: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            inner,
            api: api.into(),
            limiter,
        }
    }

    pub fn api(&self) -> &str {
        &self.api
    }
}

macro_rules! impl_rate_limited {
    ($trait:ident, $method:ident) => {
        #[async_trait]
        impl<C: $trait> $trait for RateLimited<C> {
            async fn $method(&self, payload: &Value) -> CollaboratorResult {
                self.limiter.acquire(&self.api).await?;
                self.inner.$method(payload).await
            }
        }
    };
}

impl_rate_limited!(TopicGenerator, generate_topics);
impl_rate_limited!(ContentGenerator, generate_content);
impl_rate_limited!(ContentFinisher, finish);
impl_rate_limited!(ImageGenerator, generate_images);
impl_rate_limited!(Publisher, publish);
