//! Thin façade over the task queue and the analysis queue
//!
//! Accepts `(projectId, taskId?, options)`, selects the workflow from
//! the task mode or the task's type, resolves prompt templates into
//! concrete per-step options, attaches the resolved project path, and
//! delegates to the right queue.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use projectstore::{Priority, TaskRepository};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use crate::analysis::{AnalysisError, AnalysisOptions, AnalysisQueue, AnalysisSubmission, AnalysisType};
use crate::project::{DetectError, ProjectContextService};
use crate::queue::{EnqueueRequest, QueueError, QueueSubmission, TaskQueue};
use crate::workflow::{WorkflowError, WorkflowLoader};

/// Orchestration failures, folding the per-subsystem kinds together
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("No workflow mapped for task mode '{0}'")]
    NoWorkflow(String),
}

/// Options accepted by `execute_workflow`
#[derive(Debug, Clone, Default)]
pub struct ExecuteWorkflowOptions {
    /// Workflow selector; falls back to the task's type, then `default`
    pub task_mode: Option<String>,
    pub priority: Priority,
    /// Explicit project path; skips detection when present
    pub project_path: Option<PathBuf>,
    /// Extra placeholder values for prompt resolution
    pub prompt_data: HashMap<String, String>,
    /// Opaque client options forwarded onto the queue item
    pub options: Value,
}

/// Options accepted by `run_analysis`
#[derive(Debug, Clone, Default)]
pub struct RunAnalysisOptions {
    pub priority: Priority,
    pub project_path: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
}

/// Public entry point for clients
pub struct WorkflowOrchestrationService {
    queue: Arc<TaskQueue>,
    analysis: Arc<AnalysisQueue>,
    loader: Arc<WorkflowLoader>,
    tasks: Arc<dyn TaskRepository>,
    project_context: Arc<ProjectContextService>,
}

impl WorkflowOrchestrationService {
    pub fn new(
        queue: Arc<TaskQueue>,
        analysis: Arc<AnalysisQueue>,
        loader: Arc<WorkflowLoader>,
        tasks: Arc<dyn TaskRepository>,
        project_context: Arc<ProjectContextService>,
    ) -> Self {
        Self {
            queue,
            analysis,
            loader,
            tasks,
            project_context,
        }
    }

    /// Route a task-execution request into the project queue
    pub async fn execute_workflow(
        &self,
        project_id: &str,
        user_id: &str,
        task_id: Option<String>,
        options: ExecuteWorkflowOptions,
    ) -> Result<QueueSubmission, OrchestratorError> {
        // Workflow selection: explicit mode, then the task's own type
        let selector = match (&options.task_mode, &task_id) {
            (Some(mode), _) => mode.clone(),
            (None, Some(task_id)) => self
                .tasks
                .find_by_id(task_id)
                .await
                .map(|t| t.task_type)
                .unwrap_or_else(|| "default".to_string()),
            (None, None) => "default".to_string(),
        };
        let workflow_id = self
            .loader
            .workflow_for_task_type(&selector)
            .ok_or_else(|| OrchestratorError::NoWorkflow(selector.clone()))?
            .to_string();

        let project_path = self.resolve_project_path(options.project_path.as_deref()).await?;

        // Resolve prompt templates into concrete per-step options
        let workflow = self.loader.get_workflow(&workflow_id)?;
        let mut prompt_data = options.prompt_data.clone();
        prompt_data.insert("projectId".to_string(), project_id.to_string());
        prompt_data.insert("projectPath".to_string(), project_path.display().to_string());
        if let Some(task_id) = &task_id {
            prompt_data.insert("taskId".to_string(), task_id.clone());
            if let Some(task) = self.tasks.find_by_id(task_id).await {
                prompt_data.insert("title".to_string(), task.title);
                prompt_data.insert("description".to_string(), task.description);
            }
        }

        let mut step_options = Map::new();
        for entry in &workflow.steps {
            let Some(prompt_name) = entry.options.as_ref().and_then(|o| o.get("promptName")).and_then(|v| v.as_str())
            else {
                continue;
            };
            let prompt = self.loader.format_prompt(prompt_name, &prompt_data)?;
            step_options.insert(entry.key(), json!({ "prompt": prompt }));
        }

        let mut item_options = match options.options {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        item_options.insert("projectPath".to_string(), json!(project_path.display().to_string()));
        if !step_options.is_empty() {
            item_options.insert("stepOptions".to_string(), Value::Object(step_options));
        }

        debug!(project_id, workflow_id, "Routing workflow execution to queue");
        let submission = self
            .queue
            .enqueue(EnqueueRequest {
                project_id: project_id.to_string(),
                user_id: user_id.to_string(),
                task_id,
                task_mode: selector,
                workflow_id: Some(workflow_id),
                priority: options.priority,
                options: Value::Object(item_options),
            })
            .await?;
        Ok(submission)
    }

    /// Route an analysis request into the analysis queue
    pub async fn run_analysis(
        &self,
        project_id: &str,
        types: &[String],
        options: RunAnalysisOptions,
    ) -> Result<AnalysisSubmission, OrchestratorError> {
        let mut parsed = Vec::with_capacity(types.len());
        for raw in types {
            let analysis_type: AnalysisType = raw
                .parse()
                .map_err(|_| AnalysisError::UnknownType(raw.clone()))?;
            parsed.push(analysis_type);
        }

        let project_path = self.resolve_project_path(options.project_path.as_deref()).await?;

        debug!(project_id, types = types.len(), "Routing analysis request");
        let submission = self
            .analysis
            .process_analysis_request(
                project_id,
                project_path,
                parsed,
                AnalysisOptions {
                    priority: options.priority,
                    timeout_ms: options.timeout_ms,
                },
            )
            .await?;
        Ok(submission)
    }

    async fn resolve_project_path(&self, explicit: Option<&std::path::Path>) -> Result<PathBuf, OrchestratorError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let resolved = self.project_context.resolve(&cwd).await?;
        Ok(resolved.project_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFilesystem;
    use crate::analysis::{AnalysisConfig, AnalysisExecutor, FileScanner, ScanLimits, ScriptedProbe};
    use crate::container::ServiceContainer;
    use crate::events::create_event_bus;
    use crate::queue::{QueueConfig, RetryPolicy};
    use projectstore::{
        InMemoryAnalysisRepository, InMemoryProjectRepository, InMemoryQueueHistoryRepository,
        InMemoryTaskRepository, Task,
    };
    use tempfile::tempdir;

    const WORKFLOWS: &str = r#"{
        "workflows": {
            "standard": {
                "name": "Standard",
                "steps": [
                    { "name": "send_prompt", "type": "ide", "options": { "promptName": "briefing" } }
                ]
            }
        },
        "taskTypeMapping": { "feature": "standard", "default": "standard" },
        "prompts": { "briefing": "Do {title} for {projectId} at {projectPath}" }
    }"#;

    struct Fixture {
        service: WorkflowOrchestrationService,
        queue: Arc<TaskQueue>,
        tasks: Arc<InMemoryTaskRepository>,
    }

    fn fixture() -> Fixture {
        let bus = create_event_bus();
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let queue = Arc::new(TaskQueue::new(
            QueueConfig::default(),
            RetryPolicy::default(),
            bus.clone(),
            tasks.clone(),
            Arc::new(InMemoryQueueHistoryRepository::default()),
        ));

        let analysis_config = AnalysisConfig::default();
        let scanner = FileScanner::new(
            Arc::new(LocalFilesystem::new()),
            ScanLimits {
                exclude_dirs: analysis_config.exclude_dirs.clone(),
                max_file_size: analysis_config.max_file_size,
                max_directory_depth: analysis_config.max_directory_depth,
                chunk_buffer: analysis_config.chunk_buffer,
            },
        );
        let analysis = AnalysisQueue::new(
            analysis_config.clone(),
            bus.clone(),
            Arc::new(AnalysisExecutor::new(
                analysis_config,
                bus.clone(),
                scanner,
                Arc::new(ScriptedProbe::new(vec![0])),
                Arc::new(InMemoryAnalysisRepository::new()),
            )),
        );

        let container = Arc::new(ServiceContainer::new());
        let project_context = Arc::new(ProjectContextService::new(
            Arc::new(InMemoryProjectRepository::new()),
            container,
        ));

        let service = WorkflowOrchestrationService::new(
            queue.clone(),
            analysis,
            Arc::new(WorkflowLoader::from_json(WORKFLOWS).unwrap()),
            tasks.clone(),
            project_context,
        );
        Fixture { service, queue, tasks }
    }

    #[tokio::test]
    async fn test_execute_workflow_resolves_prompts() {
        let f = fixture();
        let task = f.tasks.create(Task::new("proj", "Add login", "", "feature")).await.unwrap();

        let submission = f
            .service
            .execute_workflow(
                "proj",
                "alice",
                Some(task.id.clone()),
                ExecuteWorkflowOptions {
                    project_path: Some("/work/proj".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(submission.position, 1);

        // The enqueued item carries the resolved prompt for the step
        let status = f.queue.status("proj").await;
        let item = &status.queued[0].item;
        assert_eq!(item.workflow_id.as_deref(), Some("standard"));
        assert_eq!(
            item.options["stepOptions"]["ide.send_prompt"]["prompt"],
            "Do Add login for proj at /work/proj"
        );
        assert_eq!(item.options["projectPath"], "/work/proj");
    }

    #[tokio::test]
    async fn test_task_mode_override_and_unknown_type() {
        let f = fixture();

        // Unknown selector falls back to the default mapping
        let submission = f
            .service
            .execute_workflow(
                "proj",
                "alice",
                None,
                ExecuteWorkflowOptions {
                    task_mode: Some("exotic".to_string()),
                    project_path: Some("/work/proj".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let status = f.queue.status("proj").await;
        assert_eq!(status.queued[0].item.task_mode, "exotic");
        assert_eq!(status.queued[0].item.workflow_id.as_deref(), Some("standard"));
        let _ = submission;
    }

    #[tokio::test]
    async fn test_run_analysis_parses_types() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("f.rs"), "fn f() {}\n").unwrap();
        let f = fixture();

        let submission = f
            .service
            .run_analysis(
                "proj",
                &["code-quality".to_string(), "techstack".to_string()],
                RunAnalysisOptions {
                    project_path: Some(temp.path().to_path_buf()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(submission.position, 1);

        let err = f
            .service
            .run_analysis(
                "proj",
                &["quality".to_string()],
                RunAnalysisOptions {
                    project_path: Some(temp.path().to_path_buf()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Analysis(AnalysisError::UnknownType(_))));
    }
}
