//! Project cache rows and repository contract
//!
//! Row shape: `(id, name, workspace_path UNIQUE, type, framework?,
//! language?, metadata JSON, created_at)`. The detector caches
//! resolved roots here so repeat lookups skip the filesystem walk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// How the project root was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Monorepo,
    SingleRepo,
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monorepo => write!(f, "monorepo"),
            Self::SingleRepo => write!(f, "single_repo"),
        }
    }
}

/// A resolved workspace root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub workspace_path: PathBuf,
    pub project_type: ProjectType,
    pub framework: Option<String>,
    pub language: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, workspace_path: impl Into<PathBuf>, project_type: ProjectType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            workspace_path: workspace_path.into(),
            project_type,
            framework: None,
            language: None,
            metadata: Value::Null,
            created_at: Utc::now(),
        }
    }
}

/// Project cache contract
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Option<Project>;
    async fn find_by_workspace_path(&self, path: &Path) -> Option<Project>;
    /// Returns the cached project for `path`, inserting `candidate` if absent
    async fn find_or_create_by_workspace_path(&self, path: &Path, candidate: Project) -> Result<Project, StoreError>;
    async fn save(&self, project: Project) -> Result<Project, StoreError>;
}

/// In-memory project cache keyed by workspace path
#[derive(Default)]
pub struct InMemoryProjectRepository {
    by_path: RwLock<HashMap<PathBuf, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_by_id(&self, id: &str) -> Option<Project> {
        self.by_path.read().await.values().find(|p| p.id == id).cloned()
    }

    async fn find_by_workspace_path(&self, path: &Path) -> Option<Project> {
        self.by_path.read().await.get(path).cloned()
    }

    async fn find_or_create_by_workspace_path(&self, path: &Path, candidate: Project) -> Result<Project, StoreError> {
        let mut by_path = self.by_path.write().await;
        if let Some(existing) = by_path.get(path) {
            return Ok(existing.clone());
        }
        by_path.insert(path.to_path_buf(), candidate.clone());
        Ok(candidate)
    }

    async fn save(&self, project: Project) -> Result<Project, StoreError> {
        let mut by_path = self.by_path.write().await;
        by_path.insert(project.workspace_path.clone(), project.clone());
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_or_create_caches() {
        let repo = InMemoryProjectRepository::new();
        let path = PathBuf::from("/work/app");

        let first = repo
            .find_or_create_by_workspace_path(&path, Project::new("app", &path, ProjectType::SingleRepo))
            .await
            .unwrap();

        // Second call with a different candidate returns the cached row
        let second = repo
            .find_or_create_by_workspace_path(&path, Project::new("other", &path, ProjectType::Monorepo))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.id, "app");
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let repo = InMemoryProjectRepository::new();
        repo.save(Project::new("api", "/work/api", ProjectType::SingleRepo))
            .await
            .unwrap();

        assert!(repo.find_by_id("api").await.is_some());
        assert!(repo.find_by_id("missing").await.is_none());
    }

    #[test]
    fn test_project_type_display() {
        assert_eq!(ProjectType::Monorepo.to_string(), "monorepo");
        assert_eq!(ProjectType::SingleRepo.to_string(), "single_repo");
    }
}
