//! Store error types

use thiserror::Error;

/// Errors surfaced by repository operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Duplicate entity: {kind} {id}")]
    Duplicate { kind: &'static str, id: String },
}
