//! Queue item - one admission of a task into a project queue

use chrono::{DateTime, Utc};
use projectstore::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemState {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl QueueItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for QueueItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One admission into a project queue
///
/// `task_id` is absent for task-create workflows: creating the task is
/// the first step of the run. `options` is the opaque map forwarded
/// from the client (`createGitBranch`, `branchName`, `autoExecute`,
/// `projectPath`, `timeoutMs`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_item_id: String,
    pub project_id: String,
    pub user_id: String,
    pub task_id: Option<String>,
    pub task_mode: String,
    pub workflow_id: Option<String>,
    pub priority: Priority,
    pub options: Value,
    pub state: QueueItemState,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueueItem {
    pub fn new(
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        task_id: Option<String>,
        task_mode: impl Into<String>,
        priority: Priority,
        options: Value,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue_item_id: Uuid::now_v7().to_string(),
            project_id: project_id.into(),
            user_id: user_id.into(),
            task_id,
            task_mode: task_mode.into(),
            workflow_id: None,
            priority,
            options,
            state: QueueItemState::Queued,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            attempts: 0,
            max_attempts,
        }
    }

    /// Per-item timeout override from the options map, milliseconds
    pub fn timeout_ms(&self) -> Option<u64> {
        self.options.get("timeoutMs").and_then(|v| v.as_u64())
    }
}

/// Result of a successful enqueue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSubmission {
    pub queue_item_id: String,
    /// 1 = next to run, 0 = started immediately is never reported
    /// here (admission always queues first)
    pub position: usize,
    pub estimated_start: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(QueueItemState::Completed.is_terminal());
        assert!(QueueItemState::Failed.is_terminal());
        assert!(QueueItemState::Cancelled.is_terminal());
        assert!(!QueueItemState::Paused.is_terminal());
        assert!(!QueueItemState::Running.is_terminal());
    }

    #[test]
    fn test_new_item_defaults() {
        let item = QueueItem::new("proj", "alice", None, "create", Priority::Normal, json!({}), 2);
        assert_eq!(item.state, QueueItemState::Queued);
        assert_eq!(item.attempts, 0);
        assert!(item.task_id.is_none());
        assert!(item.timeout_ms().is_none());
    }

    #[test]
    fn test_timeout_from_options() {
        let item = QueueItem::new(
            "proj",
            "alice",
            Some("t-1".to_string()),
            "execute",
            Priority::High,
            json!({ "timeoutMs": 1500 }),
            2,
        );
        assert_eq!(item.timeout_ms(), Some(1500));
    }
}
