//! Git steps

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::adapters::GitService;
use crate::workflow::context::StepContext;
use crate::workflow::error::StepError;
use crate::workflow::step::Step;

/// Creates a working branch for the run
///
/// Options: `branchName` (default `task/<taskId>` or `workflow/<id>`),
/// `from` (default HEAD).
pub struct CreateBranchStep {
    git: Arc<GitService>,
}

impl CreateBranchStep {
    pub fn new(git: Arc<GitService>) -> Self {
        Self { git }
    }
}

#[async_trait]
impl Step for CreateBranchStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let branch = match options.get("branchName").and_then(|v| v.as_str()) {
            Some(name) => name.to_string(),
            None => match (&ctx.task_id, &ctx.workflow_id) {
                (Some(task_id), _) => format!("task/{task_id}"),
                (None, Some(workflow_id)) => format!("workflow/{workflow_id}"),
                (None, None) => {
                    return Err(StepError::InvalidOptions {
                        key: "git.create_branch".to_string(),
                        message: "branchName required when no task or workflow id is present".to_string(),
                    });
                }
            },
        };
        let from = options.get("from").and_then(|v| v.as_str());

        self.git
            .create_branch(&ctx.project_path, &branch, from)
            .await
            .map_err(|e| StepError::Failed {
                key: "git.create_branch".to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({ "branch": branch }))
    }
}

/// Checks out an existing branch
///
/// Options: `branch` (required).
pub struct CheckoutStep {
    git: Arc<GitService>,
}

impl CheckoutStep {
    pub fn new(git: Arc<GitService>) -> Self {
        Self { git }
    }
}

#[async_trait]
impl Step for CheckoutStep {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError> {
        let branch = options
            .get("branch")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepError::InvalidOptions {
                key: "git.checkout".to_string(),
                message: "branch is required".to_string(),
            })?;

        self.git
            .checkout(&ctx.project_path, branch)
            .await
            .map_err(|e| StepError::Failed {
                key: "git.checkout".to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({ "branch": branch }))
    }
}
