//! workflowd - project-scoped workflow orchestration backend
//!
//! Drives AI-assisted coding IDEs (Cursor/VSCode/Windsurf) through a
//! headless debug protocol. Task-execution requests are normalized
//! into ordered steps, scheduled against bounded per-project queues,
//! run through injected collaborators, and every state change is
//! mirrored to subscribers in real time.
//!
//! # Modules
//!
//! - [`events`] - topic pub/sub spine and the WebSocket bridge
//! - [`container`] - service container with dependency validation
//! - [`workflow`] - declarative workflows, step registry, executor
//! - [`queue`] - per-project task queues and the worker loop
//! - [`analysis`] - memory-budgeted analysis queue with partial results
//! - [`orchestrator`] - the public entry point
//! - [`project`] - monorepo-aware project root detection
//! - [`adapters`] - collaborator interfaces (IDE, git, fs, AI)
//! - [`config`] - layered YAML configuration
//! - [`daemon`] - assembly and lifecycle

pub mod adapters;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod container;
pub mod daemon;
pub mod events;
pub mod orchestrator;
pub mod project;
pub mod queue;
pub mod workflow;

// Re-export commonly used types
pub use analysis::{AnalysisQueue, AnalysisSubmission, AnalysisType, PartialReason};
pub use config::Config;
pub use container::{ProjectContextPatch, ProjectContextView, ServiceContainer, ServiceDefinition};
pub use daemon::{Daemon, DaemonDeps};
pub use events::{Event, EventBus, EventEmitter, WebSocketBridge, create_event_bus, topics};
pub use orchestrator::{ExecuteWorkflowOptions, RunAnalysisOptions, WorkflowOrchestrationService};
pub use projectstore::Priority;
pub use queue::{QueueConfig, QueueItem, QueueItemState, QueueSubmission, RetryPolicy, TaskProcessor, TaskQueue};
pub use workflow::{CancelToken, Step, StepContext, StepExecutor, StepRegistry, WorkflowLoader};
