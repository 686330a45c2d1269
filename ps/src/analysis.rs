//! Analysis result rows and repository contract
//!
//! Row shape: `(job_id, project_id, types JSON, state, started_at,
//! finished_at, result JSON or NULL, partial bool, reason?)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Terminal and in-flight states of an analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Terminal with typed partial results; explicitly not a failure
    Partial,
}

impl std::fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Partial => "partial",
        };
        write!(f, "{}", s)
    }
}

/// Persisted analysis outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub job_id: String,
    pub project_id: String,
    pub types: Vec<String>,
    pub state: AnalysisState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub partial: bool,
    pub reason: Option<String>,
}

/// Analysis row contract
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn save(&self, record: AnalysisRecord) -> Result<AnalysisRecord, StoreError>;
    async fn find_by_job_id(&self, job_id: &str) -> Option<AnalysisRecord>;
    async fn find_by_project(&self, project_id: &str) -> Vec<AnalysisRecord>;
    /// Startup hygiene: queues are in-memory, so rows left `running`
    /// by a previous process are stale and get marked cancelled.
    async fn clear_stale_running(&self) -> usize;
}

/// In-memory analysis repository
#[derive(Default)]
pub struct InMemoryAnalysisRepository {
    records: RwLock<HashMap<String, AnalysisRecord>>,
}

impl InMemoryAnalysisRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryAnalysisRepository {
    async fn save(&self, record: AnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        let mut records = self.records.write().await;
        records.insert(record.job_id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_job_id(&self, job_id: &str) -> Option<AnalysisRecord> {
        self.records.read().await.get(job_id).cloned()
    }

    async fn find_by_project(&self, project_id: &str) -> Vec<AnalysisRecord> {
        let records = self.records.read().await;
        let mut found: Vec<AnalysisRecord> =
            records.values().filter(|r| r.project_id == project_id).cloned().collect();
        found.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        found
    }

    async fn clear_stale_running(&self) -> usize {
        let mut records = self.records.write().await;
        let mut cleared = 0;
        for record in records.values_mut() {
            if matches!(record.state, AnalysisState::Running | AnalysisState::Queued) {
                record.state = AnalysisState::Cancelled;
                record.finished_at = Some(Utc::now());
                record.reason = Some("stale".to_string());
                cleared += 1;
            }
        }
        cleared
    }
}
