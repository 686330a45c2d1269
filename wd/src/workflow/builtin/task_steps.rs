//! Task lifecycle steps
//!
//! Task-create workflows run `task.create` as their first step, which
//! keeps the queue admission contract uniform: the queue item simply
//! has no task id and the workflow produces one.

use std::sync::Arc;

use async_trait::async_trait;
use projectstore::{Task, TaskRepository, TaskStatus};
use serde_json::{Value, json};

use crate::workflow::context::StepContext;
use crate::workflow::error::StepError;
use crate::workflow::step::Step;

/// Creates the task this run will work on
///
/// Options: `title` (required), `description`, `taskType`.
pub struct CreateTaskStep {
    tasks: Arc<dyn TaskRepository>,
}

impl CreateTaskStep {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Step for CreateTaskStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let key = "task.create";
        let title = options
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepError::InvalidOptions {
                key: key.to_string(),
                message: "title is required".to_string(),
            })?;
        let description = options.get("description").and_then(|v| v.as_str()).unwrap_or("");
        let task_type = options.get("taskType").and_then(|v| v.as_str()).unwrap_or("feature");

        let task = self
            .tasks
            .create(Task::new(&ctx.project_id, title, description, task_type))
            .await
            .map_err(|e| StepError::Failed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({ "taskId": task.id, "title": task.title }))
    }
}

/// Marks the run's task completed
pub struct FinalizeTaskStep {
    tasks: Arc<dyn TaskRepository>,
}

impl FinalizeTaskStep {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Step for FinalizeTaskStep {
    async fn execute(&self, ctx: StepContext, _options: Value) -> Result<Value, StepError> {
        let key = "task.finalize";

        // Either the queue item carried a task id, or an earlier
        // task.create step produced one.
        let task_id = match &ctx.task_id {
            Some(id) => id.clone(),
            None => ctx
                .artifact("task.create")
                .await
                .and_then(|a| a.get("taskId").and_then(|v| v.as_str()).map(|s| s.to_string()))
                .ok_or_else(|| StepError::InvalidOptions {
                    key: key.to_string(),
                    message: "no task id in context or task.create artifact".to_string(),
                })?,
        };

        let task = self
            .tasks
            .update_status(&task_id, TaskStatus::Completed)
            .await
            .map_err(|e| StepError::Failed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({ "taskId": task.id, "status": task.status.to_string() }))
    }
}
