//! Event type and topic vocabulary
//!
//! Topics are flat strings; every state change in the queue, workflow
//! and analysis subsystems publishes one of the topics below. The
//! WebSocket bridge translates a subset onto wire topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Queue lifecycle topics
pub mod topics {
    pub const QUEUE_ITEM_ADDED: &str = "queue:item:added";
    pub const QUEUE_ITEM_UPDATED: &str = "queue:item:updated";
    pub const QUEUE_ITEM_COMPLETED: &str = "queue:item:completed";

    pub const WORKFLOW_STEP_STARTED: &str = "workflow:step:started";
    pub const WORKFLOW_STEP_PROGRESS: &str = "workflow:step:progress";
    pub const WORKFLOW_STEP_COMPLETED: &str = "workflow:step:completed";
    pub const WORKFLOW_STEP_FAILED: &str = "workflow:step:failed";

    pub const ANALYSIS_STARTED: &str = "analysis:started";
    pub const ANALYSIS_PROGRESS: &str = "analysis:progress";
    pub const ANALYSIS_COMPLETED: &str = "analysis:completed";

    pub const GIT_CHECKOUT_COMPLETED: &str = "git:checkout:completed";
    pub const GIT_PULL_COMPLETED: &str = "git:pull:completed";
    pub const GIT_MERGE_COMPLETED: &str = "git:merge:completed";
    pub const GIT_BRANCH_CREATED: &str = "git:branch:created";

    pub const IDE_STARTED: &str = "ide-started";
    pub const IDE_STOPPED: &str = "ide-stopped";
    pub const ACTIVE_IDE_CHANGED: &str = "activeIDEChanged";
    pub const IDE_LIST_UPDATED: &str = "ideListUpdated";

    pub const CHAT_MESSAGE: &str = "chat-message";
}

/// One published event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes() {
        let event = Event::new(topics::QUEUE_ITEM_ADDED, json!({"queueItemId": "q-1"}));
        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("queue:item:added"));
        assert!(text.contains("q-1"));
    }
}
