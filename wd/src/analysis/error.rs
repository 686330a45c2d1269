//! Analysis error types

use thiserror::Error;

/// Failures surfaced by the analysis queue
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No analysis types requested")]
    NoTypes,

    #[error("Unknown analysis type: {0}")]
    UnknownType(String),

    #[error("Analysis job not found: {0}")]
    JobNotFound(String),

    #[error("Resource unavailable for project {project_id}: {what}")]
    ResourceUnavailable { project_id: String, what: &'static str },
}
