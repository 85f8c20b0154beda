//! Deterministic in-process collaborators.
//!
//! Output is derived from the payload alone, so the whole engine can be run
//! end to end without AI or blog-platform credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::collaborators::{
    CollaboratorError, CollaboratorResult, Collaborators, ContentFinisher, ContentGenerator,
    ImageGenerator, Publisher, TopicGenerator,
};

/// Most images a single request may ask for.
pub const MAX_IMAGES: u64 = 10;

#[derive(Debug, Clone, Default)]
pub struct DryRun {
    latency: Duration,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated duration of every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every role served by one dry-run instance.
    pub fn collaborators(self) -> Collaborators {
        let this = Arc::new(self);
        Collaborators {
            topics: this.clone(),
            content: this.clone(),
            finisher: this.clone(),
            images: this.clone(),
            publisher: this,
        }
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// First string found at any of `paths` (`/`-separated JSON pointers without the leading slash).
fn text<'a>(payload: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|path| payload.pointer(&format!("/{path}")).and_then(Value::as_str))
}

fn slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn title_of(payload: &Value) -> Result<String, CollaboratorError> {
    text(payload, &["content/title", "topic/selected", "topic", "title", "keyword"])
        .map(str::to_string)
        .ok_or_else(|| CollaboratorError::invalid_payload("no title, topic or keyword"))
}

#[async_trait]
impl TopicGenerator for DryRun {
    async fn generate_topics(&self, payload: &Value) -> CollaboratorResult {
        self.pause().await;
        let keyword = text(payload, &["keyword", "category"])
            .ok_or_else(|| CollaboratorError::invalid_payload("keyword is required"))?;

        let topics = vec![
            format!("{keyword}: a practical guide"),
            format!("Five things to know about {keyword}"),
            format!("Common {keyword} mistakes and how to avoid them"),
        ];
        Ok(json!({ "selected": topics[0], "topics": topics }))
    }
}

#[async_trait]
impl ContentGenerator for DryRun {
    async fn generate_content(&self, payload: &Value) -> CollaboratorResult {
        self.pause().await;
        let title = title_of(payload)?;
        let body = format!(
            "<h2>{title}</h2>\n<p>This post was drafted in dry-run mode; no model was called.</p>"
        );
        Ok(json!({
            "title": title,
            "body": body,
            "wordCount": body.split_whitespace().count(),
        }))
    }
}

#[async_trait]
impl ContentFinisher for DryRun {
    async fn finish(&self, payload: &Value) -> CollaboratorResult {
        self.pause().await;
        let mut content = payload.get("content").cloned().unwrap_or_else(|| payload.clone());
        if let Some(obj) = content.as_object_mut() {
            obj.insert("finished".into(), Value::Bool(true));
        }
        Ok(content)
    }
}

#[async_trait]
impl ImageGenerator for DryRun {
    async fn generate_images(&self, payload: &Value) -> CollaboratorResult {
        self.pause().await;
        let count = payload.get("imageCount").and_then(Value::as_u64).unwrap_or(1);
        if count > MAX_IMAGES {
            return Err(CollaboratorError::invalid_payload(format!(
                "imageCount must be at most {MAX_IMAGES}"
            )));
        }
        let slug = slug(&title_of(payload)?);
        let urls: Vec<_> = (1..=count)
            .map(|i| format!("dry-run://images/{slug}-{i}.png"))
            .collect();
        Ok(json!({ "urls": urls }))
    }
}

#[async_trait]
impl Publisher for DryRun {
    async fn publish(&self, payload: &Value) -> CollaboratorResult {
        self.pause().await;
        let title = title_of(payload)?;
        let platform = text(payload, &["platform"]).unwrap_or("blogger");
        Ok(json!({
            "platform": platform,
            "url": format!("dry-run://{platform}/{}", slug(&title)),
            "title": title,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slug("Rust: a practical guide!"), "rust-a-practical-guide");
        assert_eq!(slug("  --  "), "");
    }

    #[tokio::test]
    async fn topics_require_a_keyword() {
        let dry = DryRun::new();
        let out = dry.generate_topics(&json!({"keyword": "sourdough"})).await.unwrap();
        assert_eq!(out["selected"], "sourdough: a practical guide");
        assert_eq!(out["topics"].as_array().unwrap().len(), 3);

        let err = dry.generate_topics(&json!({})).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn content_prefers_the_selected_topic() {
        let dry = DryRun::new();
        let out = dry
            .generate_content(&json!({"keyword": "bread", "topic": {"selected": "Baking bread"}}))
            .await
            .unwrap();
        assert_eq!(out["title"], "Baking bread");
    }

    #[tokio::test]
    async fn images_honour_the_requested_count() {
        let dry = DryRun::new();
        let out = dry
            .generate_images(&json!({"title": "Hello World", "imageCount": 2}))
            .await
            .unwrap();
        assert_eq!(
            out["urls"],
            json!(["dry-run://images/hello-world-1.png", "dry-run://images/hello-world-2.png"])
        );
    }

    #[tokio::test]
    async fn image_count_is_capped() {
        let dry = DryRun::new();
        let err = dry
            .generate_images(&json!({"title": "Hello", "imageCount": u64::MAX}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid payload: imageCount must be at most 10");

        let out = dry
            .generate_images(&json!({"title": "Hello", "imageCount": MAX_IMAGES}))
            .await
            .unwrap();
        assert_eq!(out["urls"].as_array().unwrap().len(), 10);
    }
}
