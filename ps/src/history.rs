//! Bounded per-project queue history
//!
//! Terminal queue items move here; each project keeps a ring of the
//! most recent entries (default 200) so clients can inspect outcomes
//! without the queue itself growing unbounded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Default per-project ring size
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// One terminal queue-item outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHistoryEntry {
    pub queue_item_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    /// Terminal state: completed, failed or cancelled
    pub state: String,
    pub reason: Option<String>,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// History contract
#[async_trait]
pub trait QueueHistoryRepository: Send + Sync {
    async fn record(&self, entry: QueueHistoryEntry);
    async fn for_project(&self, project_id: &str) -> Vec<QueueHistoryEntry>;
}

/// In-memory bounded ring per project
pub struct InMemoryQueueHistoryRepository {
    limit: usize,
    rings: RwLock<HashMap<String, VecDeque<QueueHistoryEntry>>>,
}

impl InMemoryQueueHistoryRepository {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            rings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryQueueHistoryRepository {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl QueueHistoryRepository for InMemoryQueueHistoryRepository {
    async fn record(&self, entry: QueueHistoryEntry) {
        let mut rings = self.rings.write().await;
        let ring = rings.entry(entry.project_id.clone()).or_default();
        if ring.len() >= self.limit {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    async fn for_project(&self, project_id: &str) -> Vec<QueueHistoryEntry> {
        self.rings
            .read()
            .await
            .get(project_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}
