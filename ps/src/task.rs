//! Task entity and repository contract
//!
//! A Task is the durable, user-visible unit of work. The queue core
//! holds only task ids; all task state lives behind `TaskRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::Priority;
use crate::error::StoreError;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed and cancelled are terminal: no transition leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A user-declared unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    /// Free-form type tag, mapped to a workflow id by the loader
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task
    pub fn new(
        project_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.into(),
            title: title.into(),
            description: description.into(),
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, rejecting departures from terminal states
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), StoreError> {
        if self.status.is_terminal() && to != self.status {
            return Err(StoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// CRUD contract for tasks
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: Task) -> Result<Task, StoreError>;
    async fn find_by_id(&self, id: &str) -> Option<Task>;
    async fn find_by_project(&self, project_id: &str) -> Vec<Task>;
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory task repository
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate {
                kind: "task",
                id: task.id.clone(),
            });
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    async fn find_by_project(&self, project_id: &str) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks.values().filter(|t| t.project_id == project_id).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        found
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id).ok_or(StoreError::NotFound {
            kind: "task",
            id: id.to_string(),
        })?;
        task.transition(status)?;
        Ok(task.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.tasks.write().await.remove(id).map(|_| ()).ok_or(StoreError::NotFound {
            kind: "task",
            id: id.to_string(),
        })
    }
}
