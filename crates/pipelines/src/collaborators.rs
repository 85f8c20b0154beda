//! External services the pipelines call.
//!
//! The engine treats every collaborator as an opaque async call from a JSON
//! payload to a JSON result. Retry and rate-limit policy belong to the
//! collaborator, not to the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoblog_jobs::PipelineError;
use serde_json::Value;
use thiserror::Error;

pub type CollaboratorResult = Result<Value, CollaboratorError>;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Rate limit exceeded for {api}. Wait {}s.", whole_seconds(.retry_after))]
    RateLimited { api: String, retry_after: Duration },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl CollaboratorError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}

fn whole_seconds(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

impl From<CollaboratorError> for PipelineError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Upstream(source) => PipelineError::Collaborator(source),
            other => PipelineError::Failed(other.to_string()),
        }
    }
}

/// Proposes blog topics for a keyword or category.
#[async_trait]
pub trait TopicGenerator: Send + Sync {
    async fn generate_topics(&self, payload: &Value) -> CollaboratorResult;
}

/// Writes the post body for a topic.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(&self, payload: &Value) -> CollaboratorResult;
}

/// Editing pass over generated content.
#[async_trait]
pub trait ContentFinisher: Send + Sync {
    async fn finish(&self, payload: &Value) -> CollaboratorResult;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_images(&self, payload: &Value) -> CollaboratorResult;
}

/// Blog platform client.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: &Value) -> CollaboratorResult;
}

macro_rules! impl_for_arc {
    ($trait:ident, $method:ident) => {
        #[async_trait]
        impl<T: $trait + ?Sized> $trait for Arc<T> {
            async fn $method(&self, payload: &Value) -> CollaboratorResult {
                (**self).$method(payload).await
            }
        }
    };
}

impl_for_arc!(TopicGenerator, generate_topics);
impl_for_arc!(ContentGenerator, generate_content);
impl_for_arc!(ContentFinisher, finish);
impl_for_arc!(ImageGenerator, generate_images);
impl_for_arc!(Publisher, publish);

/// One instance of every collaborator the pipelines need.
#[derive(Clone)]
pub struct Collaborators {
    pub topics: Arc<dyn TopicGenerator>,
    pub content: Arc<dyn ContentGenerator>,
    pub finisher: Arc<dyn ContentFinisher>,
    pub images: Arc<dyn ImageGenerator>,
    pub publisher: Arc<dyn Publisher>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_rounds_wait_up() {
        let err = CollaboratorError::RateLimited {
            api: "gemini".into(),
            retry_after: Duration::from_millis(1_200),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded for gemini. Wait 2s.");

        let err = CollaboratorError::RateLimited {
            api: "gemini".into(),
            retry_after: Duration::MAX,
        };
        assert_eq!(
            err.to_string(),
            format!("Rate limit exceeded for gemini. Wait {}s.", u64::MAX)
        );
    }

    #[test]
    fn collaborator_errors_become_pipeline_failures() {
        let err: PipelineError = CollaboratorError::invalid_payload("missing keyword").into();
        assert!(matches!(err, PipelineError::Failed(ref msg) if msg == "invalid payload: missing keyword"));

        let upstream = anyhow::anyhow!("connection reset").context("502 from upstream");
        let err: PipelineError = CollaboratorError::from(upstream).into();
        assert_eq!(err.to_string(), "502 from upstream");
        let PipelineError::Collaborator(source) = err else {
            panic!("upstream errors keep their chain");
        };
        assert_eq!(format!("{source:#}"), "502 from upstream: connection reset");
    }
}
