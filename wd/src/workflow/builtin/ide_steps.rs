//! IDE steps

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::adapters::IdeAdapter;
use crate::workflow::context::StepContext;
use crate::workflow::error::StepError;
use crate::workflow::step::Step;

async fn resolve_port(ide: &dyn IdeAdapter, options: &Value, key: &str) -> Result<u16, StepError> {
    if let Some(port) = options.get("port").and_then(|v| v.as_u64()) {
        return Ok(port as u16);
    }
    ide.get_active_port().await.ok_or_else(|| StepError::Failed {
        key: key.to_string(),
        message: "no active IDE".to_string(),
    })
}

/// Opens a fresh chat panel in the active IDE
pub struct OpenChatStep {
    ide: Arc<dyn IdeAdapter>,
}

impl OpenChatStep {
    pub fn new(ide: Arc<dyn IdeAdapter>) -> Self {
        Self { ide }
    }
}

#[async_trait]
impl Step for OpenChatStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let key = "ide.open_chat";
        let port = resolve_port(self.ide.as_ref(), &options, key).await?;

        self.ide.connect(port).await.map_err(|e| StepError::Failed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        if ctx.cancellation.is_cancelled() {
            return Err(StepError::Cancelled { key: key.to_string() });
        }

        self.ide.click_new_chat(port).await.map_err(|e| StepError::Failed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        Ok(json!({ "port": port }))
    }
}

/// Sends a prompt into the IDE chat
///
/// Options: `prompt` (required), `port` (default: active IDE).
pub struct SendPromptStep {
    ide: Arc<dyn IdeAdapter>,
}

impl SendPromptStep {
    pub fn new(ide: Arc<dyn IdeAdapter>) -> Self {
        Self { ide }
    }
}

#[async_trait]
impl Step for SendPromptStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let key = "ide.send_prompt";
        let prompt = options
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepError::InvalidOptions {
                key: key.to_string(),
                message: "prompt is required".to_string(),
            })?;
        let port = resolve_port(self.ide.as_ref(), &options, key).await?;

        if ctx.cancellation.is_cancelled() {
            return Err(StepError::Cancelled { key: key.to_string() });
        }

        self.ide.send_message(port, prompt).await.map_err(|e| StepError::Failed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        Ok(json!({ "port": port, "promptLength": prompt.len() }))
    }
}

/// Points the IDE at the run's workspace
pub struct SetWorkspaceStep {
    ide: Arc<dyn IdeAdapter>,
}

impl SetWorkspaceStep {
    pub fn new(ide: Arc<dyn IdeAdapter>) -> Self {
        Self { ide }
    }
}

#[async_trait]
impl Step for SetWorkspaceStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let key = "ide.set_workspace";
        let port = resolve_port(self.ide.as_ref(), &options, key).await?;
        let path = ctx.project_path.display().to_string();

        self.ide.set_workspace(port, &path).await.map_err(|e| StepError::Failed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        Ok(json!({ "port": port, "workspacePath": path }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockIdeAdapter;
    use crate::container::ServiceContainer;

    fn context() -> StepContext {
        StepContext::new("proj", "/work/proj", "alice", Arc::new(ServiceContainer::new()))
    }

    #[tokio::test]
    async fn test_open_chat_uses_active_port() {
        let ide = Arc::new(MockIdeAdapter::new());
        let step = OpenChatStep::new(ide.clone());

        let artifact = step.execute(context(), Value::Null).await.unwrap();
        assert_eq!(artifact["port"], 9222);

        let calls = ide.calls.lock().await;
        assert_eq!(calls.as_slice(), ["connect:9222", "click_new_chat:9222"]);
    }

    #[tokio::test]
    async fn test_open_chat_no_active_ide() {
        let ide = Arc::new(MockIdeAdapter {
            active_port: None,
            ..MockIdeAdapter::new()
        });
        let err = OpenChatStep::new(ide).execute(context(), Value::Null).await.unwrap_err();
        assert!(matches!(err, StepError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_send_prompt_requires_prompt() {
        let step = SendPromptStep::new(Arc::new(MockIdeAdapter::new()));
        let err = step.execute(context(), json!({})).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidOptions { .. }));
    }

    #[tokio::test]
    async fn test_send_prompt_explicit_port() {
        let ide = Arc::new(MockIdeAdapter::new());
        let step = SendPromptStep::new(ide.clone());

        let artifact = step
            .execute(context(), json!({ "prompt": "refactor this", "port": 9333 }))
            .await
            .unwrap();
        assert_eq!(artifact["port"], 9333);
        assert_eq!(artifact["promptLength"], 13);

        let calls = ide.calls.lock().await;
        assert_eq!(calls.as_slice(), ["send_message:9333:refactor this"]);
    }

    #[tokio::test]
    async fn test_send_prompt_respects_cancellation() {
        let ide = Arc::new(MockIdeAdapter::new());
        let ctx = context();
        ctx.cancellation.cancel();

        let err = SendPromptStep::new(ide.clone())
            .execute(ctx, json!({ "prompt": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Cancelled { .. }));
        assert!(ide.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_workspace_uses_context_path() {
        let ide = Arc::new(MockIdeAdapter::new());
        let artifact = SetWorkspaceStep::new(ide.clone())
            .execute(context(), Value::Null)
            .await
            .unwrap();
        assert_eq!(artifact["workspacePath"], "/work/proj");

        let calls = ide.calls.lock().await;
        assert_eq!(calls.as_slice(), ["set_workspace:9222:/work/proj"]);
    }
}
