//! Step executor - runs registered steps with timeouts and events
//!
//! Every execution emits `workflow:step:started`, then exactly one of
//! `workflow:step:completed` (with the returned artifact) or
//! `workflow:step:failed` (with a reason). Timeouts cancel the step
//! cooperatively through a child token; a step that ignores its token
//! keeps running detached and its result is discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::events::{EventBus, topics};

use super::context::StepContext;
use super::error::StepError;
use super::loader::ResolvedWorkflow;
use super::registry::StepRegistry;
use super::step::merge_options;

/// Default per-step timeout when neither the step config nor the
/// caller provides one
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Options for a multi-step run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Keep running after a step failure
    pub continue_on_error: bool,
    /// Per-step options keyed by step key
    pub step_options: HashMap<String, Value>,
    /// Overrides the executor's default per-step timeout
    pub default_timeout: Option<Duration>,
}

/// Executes steps out of a registry with dependency-injected context
pub struct StepExecutor {
    registry: Arc<StepRegistry>,
    bus: Arc<EventBus>,
    default_timeout: Duration,
}

impl StepExecutor {
    pub fn new(registry: Arc<StepRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            bus,
            default_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Execute one step
    pub async fn execute_step(&self, key: &str, ctx: &StepContext, options: Value) -> Result<Value, StepError> {
        self.execute_step_with_timeout(key, ctx, options, None).await
    }

    async fn execute_step_with_timeout(
        &self,
        key: &str,
        ctx: &StepContext,
        options: Value,
        default_timeout: Option<Duration>,
    ) -> Result<Value, StepError> {
        let step = self.registry.get(key)?;
        let merged = merge_options(step.config.default_options.as_ref(), &options);
        let timeout = step
            .config
            .timeout_ms
            .map(Duration::from_millis)
            .or(default_timeout)
            .unwrap_or(self.default_timeout);

        self.bus
            .publish(topics::WORKFLOW_STEP_STARTED, self.step_payload(key, ctx))
            .await;

        // The step runs on its own task with a child token, so a
        // timeout cancels it cooperatively without tearing down the
        // whole run, and an uncooperative step is simply detached.
        let step_token = ctx.cancellation.child();
        let step_ctx = ctx.clone().with_cancellation(step_token.clone());
        let executor = step.executor.clone();
        let task_options = merged.clone();
        let mut handle = tokio::spawn(async move { executor.execute(step_ctx, task_options).await });

        let result = tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) => Err(StepError::Failed {
                    key: key.to_string(),
                    message: format!("step task aborted: {e}"),
                }),
            },
            _ = sleep(timeout) => {
                step_token.cancel();
                Err(StepError::Timeout {
                    key: key.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            _ = ctx.cancellation.cancelled() => {
                step_token.cancel();
                Err(StepError::Cancelled { key: key.to_string() })
            }
        };

        match result {
            Ok(artifact) => {
                ctx.insert_artifact(key, artifact.clone()).await?;
                let mut payload = self.step_payload(key, ctx);
                payload["artifact"] = artifact.clone();
                self.bus.publish(topics::WORKFLOW_STEP_COMPLETED, payload).await;
                debug!(key, "Step completed");
                Ok(artifact)
            }
            Err(e) => {
                let mut payload = self.step_payload(key, ctx);
                payload["reason"] = json!(e.reason());
                payload["error"] = json!(e.to_string());
                self.bus.publish(topics::WORKFLOW_STEP_FAILED, payload).await;
                warn!(key, error = %e, "Step failed");
                Err(e)
            }
        }
    }

    /// Execute steps sequentially
    ///
    /// Short-circuits on the first failure unless `continue_on_error`
    /// is set. Each step sees its predecessors' artifacts through the
    /// shared context.
    pub async fn execute_steps(
        &self,
        keys: &[String],
        ctx: &StepContext,
        options: &ExecuteOptions,
    ) -> Result<(), StepError> {
        for key in keys {
            if ctx.cancellation.is_cancelled() {
                return Err(StepError::Cancelled { key: key.clone() });
            }

            let step_options = options.step_options.get(key).cloned().unwrap_or(Value::Null);
            match self
                .execute_step_with_timeout(key, ctx, step_options, options.default_timeout)
                .await
            {
                Ok(_) => {}
                Err(e) if options.continue_on_error => {
                    warn!(%key, error = %e, "Continuing past failed step");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Execute a resolved workflow's steps in declaration order
    ///
    /// `overrides` carries per-step options keyed by step key (the
    /// orchestrator resolves prompt templates into these); they win
    /// over the options written in the workflow definition. A step
    /// entry with `strict: false` tolerates its own failure;
    /// everything else short-circuits the run.
    pub async fn execute_workflow(
        &self,
        workflow: &ResolvedWorkflow,
        ctx: &StepContext,
        overrides: &HashMap<String, Value>,
    ) -> Result<(), StepError> {
        for entry in &workflow.steps {
            if ctx.cancellation.is_cancelled() {
                return Err(StepError::Cancelled { key: entry.key() });
            }

            let key = entry.key();
            let entry_options = entry.options.clone().unwrap_or(Value::Null);
            let options = match overrides.get(&key) {
                Some(override_options) => merge_options(Some(&entry_options), override_options),
                None => entry_options,
            };
            match self.execute_step(&key, ctx, options).await {
                Ok(_) => {}
                Err(e) if entry.strict == Some(false) => {
                    warn!(%key, error = %e, "Non-strict step failed, continuing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn step_payload(&self, key: &str, ctx: &StepContext) -> Value {
        json!({
            "step": key,
            "projectId": ctx.project_id,
            "workflowId": ctx.workflow_id,
            "taskId": ctx.task_id,
        })
    }
}
