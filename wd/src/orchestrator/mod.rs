//! Workflow orchestration service - the public entry point

mod service;

pub use service::{ExecuteWorkflowOptions, OrchestratorError, RunAnalysisOptions, WorkflowOrchestrationService};
