//! Chat message persistence contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// One message in an IDE chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    /// "user" or "assistant"
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            project_id: project_id.into(),
            sender: sender.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Chat contract
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn append(&self, message: ChatMessage);
    async fn for_project(&self, project_id: &str) -> Vec<ChatMessage>;
}

/// In-memory chat log
#[derive(Default)]
pub struct InMemoryChatRepository {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn append(&self, message: ChatMessage) {
        self.messages.write().await.push(message);
    }

    async fn for_project(&self, project_id: &str) -> Vec<ChatMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect()
    }
}
