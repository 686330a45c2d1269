//! Task processor - drains project queues into the step engine
//!
//! One long-lived worker loop per process. Wakeups are idle-wait
//! driven through the queue's notifier; each wake dispatches every
//! runnable item (across projects, within per-project caps) onto its
//! own task. Shutdown stops pulling, waits out a grace period, then
//! cancels in-flight tokens.

use std::sync::Arc;
use std::time::Duration;

use projectstore::{TaskRepository, TaskStatus};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::container::ServiceContainer;
use crate::workflow::{CancelToken, StepContext, StepError, StepExecutor, WorkflowLoader};

use super::core::{Dispatch, RunOutcome, TaskQueue};
use super::item::{QueueItem, QueueItemState};
use super::retry::ErrorKind;

/// Processor tuning
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// How long to wait for in-flight items on shutdown before
    /// cancelling their tokens
    pub shutdown_grace: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Background worker that executes queue items as workflows
pub struct TaskProcessor {
    queue: Arc<TaskQueue>,
    loader: Arc<WorkflowLoader>,
    executor: Arc<StepExecutor>,
    services: Arc<ServiceContainer>,
    tasks: Arc<dyn TaskRepository>,
    config: ProcessorConfig,
    shutdown: CancelToken,
}

impl TaskProcessor {
    pub fn new(
        queue: Arc<TaskQueue>,
        loader: Arc<WorkflowLoader>,
        executor: Arc<StepExecutor>,
        services: Arc<ServiceContainer>,
        tasks: Arc<dyn TaskRepository>,
        config: ProcessorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            loader,
            executor,
            services,
            tasks,
            config,
            shutdown: CancelToken::new(),
        })
    }

    /// Spawn the worker loop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(this.run())
    }

    /// Signal shutdown; await the handle returned by `start` to join
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    async fn run(self: Arc<Self>) {
        info!("Task processor started");
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            while inflight.try_join_next().is_some() {}

            while let Some(dispatch) = self.queue.take_next().await {
                let this = self.clone();
                inflight.spawn(async move { this.run_item(dispatch).await });
            }

            tokio::select! {
                _ = self.queue.work_available() => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        debug!(inflight = inflight.len(), "Task processor draining");
        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Shutdown grace elapsed, cancelling in-flight items");
            self.queue.cancel_all_running().await;
            while inflight.join_next().await.is_some() {}
        }
        info!("Task processor stopped");
    }

    async fn run_item(&self, dispatch: Dispatch) {
        let Dispatch { item, token } = dispatch;
        let queue_item_id = item.queue_item_id.clone();

        let outcome = self.execute_item(&item, token).await;
        let terminal = self.queue.complete_item(&queue_item_id, outcome).await;

        // Mirror the terminal state onto the task row. The finalize
        // step may have completed the task already; terminal-state
        // transitions on the task are then a no-op conflict we drop.
        if let (Some(state), Some(task_id)) = (terminal, &item.task_id) {
            let status = match state {
                QueueItemState::Completed => TaskStatus::Completed,
                QueueItemState::Cancelled => TaskStatus::Cancelled,
                _ => TaskStatus::Failed,
            };
            if let Err(e) = self.tasks.update_status(task_id, status).await {
                debug!(%task_id, error = %e, "Task status not updated");
            }
        }
    }

    async fn execute_item(&self, item: &QueueItem, token: CancelToken) -> RunOutcome {
        // Workflow selection: explicit id, then task-mode mapping
        let workflow_id = match &item.workflow_id {
            Some(id) => id.clone(),
            None => match self.loader.workflow_for_task_type(&item.task_mode) {
                Some(id) => id.to_string(),
                None => {
                    return RunOutcome::Failed {
                        kind: ErrorKind::Validation,
                        reason: format!("no workflow for task mode '{}'", item.task_mode),
                    };
                }
            },
        };

        let workflow = match self.loader.get_workflow(&workflow_id) {
            Ok(workflow) => workflow,
            Err(e) => {
                return RunOutcome::Failed {
                    kind: ErrorKind::Dependency,
                    reason: e.to_string(),
                };
            }
        };

        if let Some(task_id) = &item.task_id {
            if let Err(e) = self.tasks.update_status(task_id, TaskStatus::Running).await {
                debug!(%task_id, error = %e, "Task not marked running");
            }
        }

        let project_path = item
            .options
            .get("projectPath")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| {
                self.services
                    .project_context()
                    .project_path
                    .map(|p| p.display().to_string())
            })
            .unwrap_or_else(|| ".".to_string());

        let mut ctx = StepContext::new(&item.project_id, project_path, &item.user_id, self.services.clone())
            .with_workflow(workflow_id.clone())
            .with_cancellation(token.clone());
        if let Some(task_id) = &item.task_id {
            ctx = ctx.with_task(task_id.clone());
        }

        let item_timeout = item
            .timeout_ms()
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.queue.config().default_timeout());

        debug!(
            queue_item_id = %item.queue_item_id,
            workflow_id = %workflow_id,
            "Executing workflow"
        );

        // Per-step option overrides resolved by the orchestrator ride
        // along in the item options
        let overrides: std::collections::HashMap<String, serde_json::Value> = item
            .options
            .get("stepOptions")
            .and_then(|v| v.as_object())
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let result = tokio::select! {
            result = self.executor.execute_workflow(&workflow, &ctx, &overrides) => result,
            _ = tokio::time::sleep(item_timeout) => {
                token.cancel();
                return RunOutcome::Failed {
                    kind: ErrorKind::Timeout,
                    reason: "timeout".to_string(),
                };
            }
        };

        match result {
            // Result of a run whose cancellation was ignored is discarded
            Ok(()) if token.is_cancelled() => RunOutcome::Cancelled,
            Ok(()) => RunOutcome::Completed,
            Err(StepError::Cancelled { .. }) => RunOutcome::Cancelled,
            Err(e) => RunOutcome::Failed {
                kind: ErrorKind::from_step_error(&e),
                reason: match &e {
                    StepError::Timeout { .. } => "timeout".to_string(),
                    other => other.to_string(),
                },
            },
        }
    }
}
