//! Queue error types

use thiserror::Error;

/// Failures surfaced by queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue full for project {project_id} (max {max_size})")]
    QueueFull { project_id: String, max_size: usize },

    #[error("Queue item not found: {0}")]
    ItemNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {task_id} is already {status}")]
    TaskAlreadyTerminal { task_id: String, status: String },

    #[error("Queue item {queue_item_id} is {state}, cannot {operation}")]
    InvalidState {
        queue_item_id: String,
        state: String,
        operation: &'static str,
    },

    #[error("Invalid position {position} (queued band holds {len})")]
    InvalidPosition { position: usize, len: usize },
}
