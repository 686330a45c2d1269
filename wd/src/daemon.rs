//! Daemon assembly - builds the container, wires subsystems, runs the
//! processor and bridge
//!
//! Collaborator implementations (IDE, git, AI, filesystem, WebSocket
//! sink, repositories) are injected; everything inside the core is
//! registered in the service container with its declared dependencies
//! and resolved through it, so a wiring mistake fails at startup
//! rather than mid-request.

use std::sync::Arc;

use eyre::{Context, Result};
use projectstore::{
    AnalysisRepository, ChatRepository, ProjectRepository, QueueHistoryRepository, TaskRepository,
    UserSessionRepository,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::{AiProvider, FilesystemService, GitAdapter, GitService, IdeAdapter};
use crate::analysis::{AnalysisExecutor, AnalysisQueue, FileScanner, MemoryProbe, ProcessMemoryProbe, ScanLimits};
use crate::config::Config;
use crate::container::{ServiceContainer, ServiceDefinition, ServiceRef};
use crate::events::{ClientSink, EventBus, WebSocketBridge, create_event_bus};
use crate::orchestrator::WorkflowOrchestrationService;
use crate::project::ProjectContextService;
use crate::queue::{ProcessorConfig, TaskProcessor, TaskQueue};
use crate::workflow::{BuiltinDeps, StepExecutor, StepRegistry, WorkflowLoader, register_builtin_steps};

/// Injected collaborators and repositories
pub struct DaemonDeps {
    pub ide: Arc<dyn IdeAdapter>,
    pub git: Arc<dyn GitAdapter>,
    pub ai: Arc<dyn AiProvider>,
    pub fs: Arc<dyn FilesystemService>,
    pub sink: Arc<dyn ClientSink>,
    pub tasks: Arc<dyn TaskRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub history: Arc<dyn QueueHistoryRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
    pub sessions: Arc<dyn UserSessionRepository>,
    pub chats: Arc<dyn ChatRepository>,
    /// Defaults to the /proc-based probe
    pub memory_probe: Option<Arc<dyn MemoryProbe>>,
}

/// The assembled daemon
pub struct Daemon {
    container: Arc<ServiceContainer>,
    bus: Arc<EventBus>,
    orchestrator: Arc<WorkflowOrchestrationService>,
    processor: Arc<TaskProcessor>,
    analyses: Arc<dyn AnalysisRepository>,
    chats: Arc<dyn ChatRepository>,
    bridge: WebSocketBridge,
    processor_handle: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Wire everything together; nothing runs until `start`
    pub fn build(config: Config, deps: DaemonDeps) -> Result<Self> {
        let container = Arc::new(ServiceContainer::new());
        let bus = create_event_bus();

        let loader = match &config.workflows.path {
            Some(path) => Arc::new(WorkflowLoader::load(path).context("loading workflow definitions")?),
            None => Arc::new(WorkflowLoader::embedded_defaults().context("parsing embedded workflow defaults")?),
        };

        // Step registry with the builtin library and framework plug-ins
        let registry = Arc::new(StepRegistry::new());
        let git_service = Arc::new(GitService::new(deps.git.clone(), bus.clone()));
        register_builtin_steps(
            &registry,
            &BuiltinDeps {
                git: git_service,
                ide: deps.ide.clone(),
                ai: deps.ai.clone(),
                tasks: deps.tasks.clone(),
            },
        )
        .context("registering builtin steps")?;
        for dir in &config.workflows.framework_dirs {
            match registry.load_framework(dir) {
                Ok(steps) => info!(dir = %dir.display(), steps = steps.len(), "Loaded framework"),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Skipping framework"),
            }
        }

        let executor = Arc::new(
            StepExecutor::new(registry.clone(), bus.clone()).with_default_timeout(config.queue.default_timeout()),
        );

        let queue = Arc::new(TaskQueue::new(
            config.queue.clone(),
            config.retry.policy(),
            bus.clone(),
            deps.tasks.clone(),
            deps.history.clone(),
        ));

        let processor = TaskProcessor::new(
            queue.clone(),
            loader.clone(),
            executor.clone(),
            container.clone(),
            deps.tasks.clone(),
            ProcessorConfig {
                shutdown_grace: std::time::Duration::from_millis(config.processor.shutdown_grace_ms),
            },
        );

        let scanner = FileScanner::new(
            deps.fs.clone(),
            ScanLimits {
                exclude_dirs: config.analysis.exclude_dirs.clone(),
                max_file_size: config.analysis.max_file_size,
                max_directory_depth: config.analysis.max_directory_depth,
                chunk_buffer: config.analysis.chunk_buffer,
            },
        );
        let probe = deps
            .memory_probe
            .clone()
            .unwrap_or_else(|| Arc::new(ProcessMemoryProbe::new()));
        let analysis_queue = AnalysisQueue::new(
            config.analysis.clone(),
            bus.clone(),
            Arc::new(AnalysisExecutor::new(
                config.analysis.clone(),
                bus.clone(),
                scanner,
                probe,
                deps.analyses.clone(),
            )),
        );

        let project_context = Arc::new(ProjectContextService::new(deps.projects.clone(), container.clone()));

        let orchestrator = Arc::new(WorkflowOrchestrationService::new(
            queue.clone(),
            analysis_queue.clone(),
            loader.clone(),
            deps.tasks.clone(),
            project_context.clone(),
        ));

        // Mirror the core services into the container so any consumer
        // can resolve them by name, and so the dependency graph is
        // validated as a whole at startup.
        register_services(
            &container,
            bus.clone(),
            loader,
            registry,
            executor,
            queue,
            analysis_queue,
            project_context,
            orchestrator.clone(),
        )?;
        container
            .validate_dependencies()
            .map_err(|e| eyre::eyre!(e.to_string()))
            .context("service graph validation")?;

        Ok(Self {
            container,
            bus,
            orchestrator,
            processor,
            analyses: deps.analyses,
            chats: deps.chats,
            bridge: WebSocketBridge::new(deps.sink, deps.sessions),
            processor_handle: None,
        })
    }

    /// Start the bridge and the worker loop
    pub async fn start(&mut self) -> Result<()> {
        // Queues are in-memory: rows left running by a previous
        // process are stale
        let cleared = self.analyses.clear_stale_running().await;
        if cleared > 0 {
            warn!(cleared, "Cleared stale running analysis rows");
        }

        self.bridge.attach(&self.bus).await;

        // Chat traffic on the bus is persisted as conversation history
        let chats = self.chats.clone();
        self.bus
            .subscribe(crate::events::topics::CHAT_MESSAGE, move |event| {
                let chats = chats.clone();
                async move {
                    let payload = &event.payload;
                    let (Some(user_id), Some(project_id), Some(content)) = (
                        payload.get("userId").and_then(|v| v.as_str()),
                        payload.get("projectId").and_then(|v| v.as_str()),
                        payload.get("content").and_then(|v| v.as_str()),
                    ) else {
                        return Ok(());
                    };
                    let sender = payload.get("sender").and_then(|v| v.as_str()).unwrap_or("user");
                    chats
                        .append(projectstore::ChatMessage::new(user_id, project_id, sender, content))
                        .await;
                    Ok(())
                }
            })
            .await;

        let failed = self.container.start_all_services().await;
        for (name, error) in &failed {
            warn!(service = %name, error = %error, "Service start hook failed");
        }

        self.processor_handle = Some(self.processor.start());
        info!("Daemon started");
        Ok(())
    }

    /// Graceful stop: drain the processor, run stop hooks
    pub async fn stop(&mut self) {
        self.processor.stop();
        if let Some(handle) = self.processor_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Processor join failed");
            }
        }
        self.container.stop_all_services().await;
        info!("Daemon stopped");
    }

    pub fn orchestrator(&self) -> Arc<WorkflowOrchestrationService> {
        self.orchestrator.clone()
    }

    pub fn container(&self) -> Arc<ServiceContainer> {
        self.container.clone()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }
}

#[allow(clippy::too_many_arguments)]
fn register_services(
    container: &Arc<ServiceContainer>,
    bus: Arc<EventBus>,
    loader: Arc<WorkflowLoader>,
    registry: Arc<StepRegistry>,
    executor: Arc<StepExecutor>,
    queue: Arc<TaskQueue>,
    analysis_queue: Arc<AnalysisQueue>,
    project_context: Arc<ProjectContextService>,
    orchestrator: Arc<WorkflowOrchestrationService>,
) -> Result<()> {
    let entries: Vec<(&str, &[&str], ServiceRef)> = vec![
        ("event-bus", &[], bus),
        ("workflow-loader", &[], loader),
        ("step-registry", &[], registry),
        ("step-executor", &["step-registry", "event-bus"], executor),
        ("task-queue", &["event-bus"], queue),
        ("analysis-queue", &["event-bus"], analysis_queue),
        ("project-context", &[], project_context),
        (
            "orchestration-service",
            &["task-queue", "analysis-queue", "workflow-loader", "project-context"],
            orchestrator,
        ),
    ];

    for (name, dependencies, service) in entries {
        let service = service.clone();
        container
            .register(
                name,
                ServiceDefinition::singleton(move |_| Ok(service.clone())).with_dependencies(dependencies),
            )
            .map_err(|e| eyre::eyre!(e.to_string()))
            .context("registering core services")?;
    }
    Ok(())
}
