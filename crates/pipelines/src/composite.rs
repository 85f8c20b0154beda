//! The full post pipeline: topic → content → finishing → images → publish.

use async_trait::async_trait;
use autoblog_jobs::{Pipeline, PipelineContext, PipelineError, PipelineOutput};
use serde_json::{Map, Value, json};

use crate::collaborators::Collaborators;
use crate::steps::Step;

/// Runs every step of a post in order, feeding each output forward.
///
/// Payload switches:
/// - `finishing: true` adds the editing pass (off by default);
/// - `imageCount: 0` skips image generation;
/// - `publish: false` stops before publishing.
#[derive(Debug, Clone)]
pub struct CompositePipeline {
    collaborators: Collaborators,
}

impl CompositePipeline {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Pipeline for CompositePipeline {
    async fn run(&self, ctx: PipelineContext) -> PipelineOutput {
        let Value::Object(base) = &ctx.payload else {
            return Err(PipelineError::failed("composite pipeline payload must be a JSON object"));
        };
        let c = &self.collaborators;
        let mut input = base.clone();

        let topic = Step::Topics(c.topics.clone()).run(&ctx, &Value::Object(input.clone())).await?;
        input.insert("topic".into(), topic.clone());

        let mut content = Step::Content(c.content.clone())
            .run(&ctx, &Value::Object(input.clone()))
            .await?;
        input.insert("content".into(), content.clone());

        if flag(base, "finishing", false) {
            content = Step::Finishing(c.finisher.clone())
                .run(&ctx, &Value::Object(input.clone()))
                .await?;
            input.insert("content".into(), content.clone());
        } else {
            ctx.logger.debug("Skipping finishing");
        }

        let images = if base.get("imageCount").and_then(Value::as_u64) == Some(0) {
            ctx.logger.info("Skipping image generation: imageCount is 0");
            Value::Null
        } else {
            let images = Step::Images(c.images.clone())
                .run(&ctx, &Value::Object(input.clone()))
                .await?;
            input.insert("images".into(), images.clone());
            images
        };

        let published = if flag(base, "publish", true) {
            Step::Publish(c.publisher.clone())
                .run(&ctx, &Value::Object(input))
                .await?
        } else {
            ctx.logger.info("Skipping publish: publish is false");
            Value::Null
        };

        ctx.checkpoint()?;
        Ok(json!({
            "topic": topic,
            "content": content,
            "images": images,
            "published": published,
        }))
    }
}

fn flag(payload: &Map<String, Value>, key: &str, default: bool) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        CollaboratorResult, ContentFinisher, ContentGenerator, ImageGenerator, Publisher,
        TopicGenerator,
    };
    use autoblog_jobs::{InMemoryJobStore, Job, JobLogger, JobStore, JobType, SharedJobStore};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    /// Records every call and answers with a fixed value per step.
    #[derive(Default)]
    struct Script {
        calls: Mutex<Vec<(&'static str, Value)>>,
        cancel_after: Mutex<Option<(&'static str, CancellationToken)>>,
    }

    impl Script {
        fn record(&self, step: &'static str, input: &Value) -> CollaboratorResult {
            self.calls.lock().unwrap().push((step, input.clone()));
            if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
                if *after == step {
                    token.cancel();
                }
            }
            Ok(json!(format!("{step} output")))
        }

        fn steps(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
        }

        fn input_of(&self, step: &str) -> Value {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(s, _)| *s == step)
                .map(|(_, v)| v.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl TopicGenerator for Script {
        async fn generate_topics(&self, payload: &Value) -> CollaboratorResult {
            self.record("topics", payload)
        }
    }

    #[async_trait]
    impl ContentGenerator for Script {
        async fn generate_content(&self, payload: &Value) -> CollaboratorResult {
            self.record("content", payload)
        }
    }

    #[async_trait]
    impl ContentFinisher for Script {
        async fn finish(&self, payload: &Value) -> CollaboratorResult {
            self.record("finishing", payload)
        }
    }

    #[async_trait]
    impl ImageGenerator for Script {
        async fn generate_images(&self, payload: &Value) -> CollaboratorResult {
            self.record("images", payload)
        }
    }

    #[async_trait]
    impl Publisher for Script {
        async fn publish(&self, payload: &Value) -> CollaboratorResult {
            self.record("publish", payload)
        }
    }

    fn pipeline(script: &Arc<Script>) -> CompositePipeline {
        CompositePipeline::new(Collaborators {
            topics: script.clone(),
            content: script.clone(),
            finisher: script.clone(),
            images: script.clone(),
            publisher: script.clone(),
        })
    }

    fn ctx(payload: Value, token: CancellationToken) -> (SharedJobStore, PipelineContext) {
        let store = InMemoryJobStore::shared();
        let job_id = store
            .insert(Job::new(JobType::CompositePipeline, payload.clone()))
            .unwrap();
        let ctx = PipelineContext {
            job_id,
            job_type: JobType::CompositePipeline,
            payload,
            cancellation: token,
            logger: JobLogger::new(job_id, store.clone()),
        };
        (store, ctx)
    }

    #[tokio::test]
    async fn runs_every_step_and_feeds_outputs_forward() {
        let script = Arc::new(Script::default());
        let (_store, ctx) = ctx(
            json!({"keyword": "rust", "finishing": true, "imageCount": 2}),
            CancellationToken::new(),
        );

        let out = pipeline(&script).run(ctx).await.unwrap();

        assert_eq!(script.steps(), vec!["topics", "content", "finishing", "images", "publish"]);
        assert_eq!(script.input_of("content")["topic"], "topics output");
        assert_eq!(script.input_of("images")["content"], "finishing output");
        assert_eq!(script.input_of("publish")["images"], "images output");
        assert_eq!(script.input_of("publish")["keyword"], "rust");
        assert_eq!(
            out,
            json!({
                "topic": "topics output",
                "content": "finishing output",
                "images": "images output",
                "published": "publish output",
            })
        );
    }

    #[tokio::test]
    async fn optional_steps_follow_the_payload_switches() {
        let script = Arc::new(Script::default());
        let (store, ctx) = ctx(
            json!({"keyword": "rust", "imageCount": 0, "publish": false}),
            CancellationToken::new(),
        );
        let job_id = ctx.job_id;

        let out = pipeline(&script).run(ctx).await.unwrap();

        assert_eq!(script.steps(), vec!["topics", "content"]);
        assert_eq!(out["images"], Value::Null);
        assert_eq!(out["published"], Value::Null);
        let messages: Vec<_> = store.logs(job_id).unwrap().into_iter().map(|l| l.message).collect();
        assert!(messages.contains(&"Skipping publish: publish is false".to_string()));
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_step() {
        let script = Arc::new(Script::default());
        let token = CancellationToken::new();
        *script.cancel_after.lock().unwrap() = Some(("content", token.clone()));
        let (_store, ctx) = ctx(json!({"keyword": "rust"}), token);

        let err = pipeline(&script).run(ctx).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(script.steps(), vec!["topics", "content"]);
    }

    #[tokio::test]
    async fn non_object_payload_is_rejected() {
        let script = Arc::new(Script::default());
        let (_store, ctx) = ctx(json!("just a keyword"), CancellationToken::new());

        let err = pipeline(&script).run(ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "composite pipeline payload must be a JSON object");
        assert!(script.steps().is_empty());
    }
}
