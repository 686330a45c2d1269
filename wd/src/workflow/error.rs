//! Workflow and step error types

use thiserror::Error;

/// Failures in loading and resolving declarative workflows
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow inheritance cycle: {}", chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },

    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("Failed to read workflow file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures in step registration and execution
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step not registered: {0}")]
    NotRegistered(String),

    #[error("Step already registered: {0}")]
    Duplicate(String),

    #[error("Step dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("Step {key} timed out after {timeout_ms}ms")]
    Timeout { key: String, timeout_ms: u64 },

    #[error("Step {key} was cancelled")]
    Cancelled { key: String },

    #[error("Artifact already written for {key}")]
    ArtifactOverwrite { key: String },

    #[error("Invalid options for step {key}: {message}")]
    InvalidOptions { key: String, message: String },

    #[error("Step {key} failed: {message}")]
    Failed { key: String, message: String },

    #[error("Framework manifest error at {path}: {message}")]
    Manifest { path: String, message: String },
}

impl StepError {
    /// Short reason string carried in `workflow:step:failed` payloads
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidOptions { .. } => "invalid-options",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_reason() {
        let err = StepError::Timeout {
            key: "git.checkout".to_string(),
            timeout_ms: 100,
        };
        assert_eq!(err.reason(), "timeout");
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_inheritance_cycle_chain() {
        let err = WorkflowError::InheritanceCycle {
            chain: vec!["child".to_string(), "parent".to_string(), "child".to_string()],
        };
        assert!(err.to_string().contains("child -> parent -> child"));
    }
}
