//! Builtin step library
//!
//! The steps the stock workflows are built from, each wrapping one
//! collaborator capability. Framework plug-ins compose on top of
//! these via manifest-declared base executors.

mod ai_steps;
mod git_steps;
mod ide_steps;
mod task_steps;

use std::sync::Arc;

use projectstore::TaskRepository;

use crate::adapters::{AiProvider, GitService, IdeAdapter};

use super::error::StepError;
use super::registry::StepRegistry;
use super::step::StepConfig;

pub use ai_steps::ReviewResponseStep;
pub use git_steps::{CheckoutStep, CreateBranchStep};
pub use ide_steps::{OpenChatStep, SendPromptStep, SetWorkspaceStep};
pub use task_steps::{CreateTaskStep, FinalizeTaskStep};

/// Collaborators the builtin steps are constructed over
pub struct BuiltinDeps {
    pub git: Arc<GitService>,
    pub ide: Arc<dyn IdeAdapter>,
    pub ai: Arc<dyn AiProvider>,
    pub tasks: Arc<dyn TaskRepository>,
}

/// Register the standard step set
pub fn register_builtin_steps(registry: &StepRegistry, deps: &BuiltinDeps) -> Result<(), StepError> {
    registry.register_step(
        "task.create",
        StepConfig::new("task", "task").with_description("Create the task this run works on"),
        Arc::new(CreateTaskStep::new(deps.tasks.clone())),
    )?;
    registry.register_step(
        "task.finalize",
        StepConfig::new("task", "task").with_description("Mark the run's task completed"),
        Arc::new(FinalizeTaskStep::new(deps.tasks.clone())),
    )?;

    registry.register_step(
        "git.create_branch",
        StepConfig::new("git", "git")
            .with_description("Create a working branch")
            .with_timeout_ms(30_000),
        Arc::new(CreateBranchStep::new(deps.git.clone())),
    )?;
    registry.register_step(
        "git.checkout",
        StepConfig::new("git", "git")
            .with_description("Check out a branch")
            .with_timeout_ms(30_000),
        Arc::new(CheckoutStep::new(deps.git.clone())),
    )?;

    registry.register_step(
        "ide.set_workspace",
        StepConfig::new("ide", "ide").with_description("Point the IDE at the project workspace"),
        Arc::new(SetWorkspaceStep::new(deps.ide.clone())),
    )?;
    registry.register_step(
        "ide.open_chat",
        StepConfig::new("ide", "ide").with_description("Open a fresh chat panel"),
        Arc::new(OpenChatStep::new(deps.ide.clone())),
    )?;
    registry.register_step(
        "ide.send_prompt",
        StepConfig::new("ide", "ide")
            .with_description("Send a prompt into the IDE chat")
            .with_dependencies(&["ide.open_chat"]),
        Arc::new(SendPromptStep::new(deps.ide.clone())),
    )?;

    registry.register_step(
        "ai.review_response",
        StepConfig::new("ai", "ai")
            .with_description("Review the IDE response")
            .with_timeout_ms(120_000),
        Arc::new(ReviewResponseStep::new(deps.ai.clone())),
    )?;

    Ok(())
}
