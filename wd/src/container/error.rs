//! Service container error types

use thiserror::Error;

/// Failures surfaced during registration, validation or resolution
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Service not registered: {name} (chain: {})", chain.join(" -> "))]
    DependencyNotFound { name: String, chain: Vec<String> },

    #[error("Dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("Failed to construct service {name}: {cause}")]
    DependencyConstructionFailed { name: String, cause: String },

    #[error("Service already registered: {name}")]
    DuplicateService { name: String },

    #[error("Service {name} is not of the requested type")]
    TypeMismatch { name: String },
}
