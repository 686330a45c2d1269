//! AI steps

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::adapters::AiProvider;
use crate::workflow::context::StepContext;
use crate::workflow::error::StepError;
use crate::workflow::step::Step;

/// Asks the AI provider to review the IDE's response
///
/// Options: `prompt` (required; the orchestrator resolves it from the
/// prompt templates before enqueueing).
pub struct ReviewResponseStep {
    ai: Arc<dyn AiProvider>,
}

impl ReviewResponseStep {
    pub fn new(ai: Arc<dyn AiProvider>) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl Step for ReviewResponseStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let key = "ai.review_response";
        let prompt = options
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepError::InvalidOptions {
                key: key.to_string(),
                message: "prompt is required".to_string(),
            })?;

        if ctx.cancellation.is_cancelled() {
            return Err(StepError::Cancelled { key: key.to_string() });
        }

        let review = self.ai.chat(prompt, &options).await.map_err(|e| StepError::Failed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        Ok(json!({ "review": review }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAiProvider;
    use crate::container::ServiceContainer;

    fn context() -> StepContext {
        StepContext::new("proj", "/work/proj", "alice", Arc::new(ServiceContainer::new()))
    }

    #[tokio::test]
    async fn test_review_returns_ai_text() {
        let ai = Arc::new(MockAiProvider::new(vec!["looks good".to_string()]));
        let step = ReviewResponseStep::new(ai.clone());

        let artifact = step
            .execute(context(), json!({ "prompt": "Review the diff" }))
            .await
            .unwrap();
        assert_eq!(artifact["review"], "looks good");
        assert_eq!(ai.prompts.lock().await.as_slice(), ["Review the diff"]);
    }

    #[tokio::test]
    async fn test_review_requires_prompt() {
        let step = ReviewResponseStep::new(Arc::new(MockAiProvider::echoing()));
        let err = step.execute(context(), json!({})).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidOptions { .. }));
    }
}
