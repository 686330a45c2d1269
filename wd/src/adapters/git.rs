//! Git adapter capability and the evented wrapper the core uses
//!
//! `GitAdapter` is the raw capability; `GitService` wraps it so that
//! every completed operation publishes its `git:<op>:completed` event
//! with `{projectPath, branch?}`, which the WebSocket bridge mirrors
//! to clients as branch/status updates.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::{EventBus, topics};

/// Working-tree status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitStatus {
    pub branch: String,
    pub clean: bool,
    pub ahead: u32,
    pub behind: u32,
    pub modified: Vec<String>,
}

/// Raw git capability implemented outside the core
#[async_trait]
pub trait GitAdapter: Send + Sync {
    async fn status(&self, path: &Path) -> eyre::Result<GitStatus>;
    async fn branches(&self, path: &Path) -> eyre::Result<Vec<String>>;
    async fn checkout(&self, path: &Path, branch: &str) -> eyre::Result<()>;
    async fn pull(&self, path: &Path, branch: &str) -> eyre::Result<()>;
    async fn merge(&self, path: &Path, source: &str, target: &str) -> eyre::Result<()>;
    async fn create_branch(&self, path: &Path, name: &str, from: Option<&str>) -> eyre::Result<()>;
    async fn compare(&self, path: &Path, a: &str, b: &str) -> eyre::Result<Vec<String>>;
}

/// Git operations with lifecycle events attached
pub struct GitService {
    adapter: Arc<dyn GitAdapter>,
    bus: Arc<EventBus>,
}

impl GitService {
    pub fn new(adapter: Arc<dyn GitAdapter>, bus: Arc<EventBus>) -> Self {
        Self { adapter, bus }
    }

    pub async fn status(&self, path: &Path) -> eyre::Result<GitStatus> {
        self.adapter.status(path).await
    }

    pub async fn branches(&self, path: &Path) -> eyre::Result<Vec<String>> {
        self.adapter.branches(path).await
    }

    pub async fn checkout(&self, path: &Path, branch: &str) -> eyre::Result<()> {
        self.adapter.checkout(path, branch).await?;
        self.bus
            .publish(
                topics::GIT_CHECKOUT_COMPLETED,
                json!({ "projectPath": path.display().to_string(), "branch": branch }),
            )
            .await;
        Ok(())
    }

    pub async fn pull(&self, path: &Path, branch: &str) -> eyre::Result<()> {
        self.adapter.pull(path, branch).await?;
        let status = self.adapter.status(path).await.unwrap_or_default();
        self.bus
            .publish(
                topics::GIT_PULL_COMPLETED,
                json!({
                    "projectPath": path.display().to_string(),
                    "branch": branch,
                    "gitStatus": status,
                }),
            )
            .await;
        Ok(())
    }

    pub async fn merge(&self, path: &Path, source: &str, target: &str) -> eyre::Result<()> {
        self.adapter.merge(path, source, target).await?;
        let status = self.adapter.status(path).await.unwrap_or_default();
        self.bus
            .publish(
                topics::GIT_MERGE_COMPLETED,
                json!({
                    "projectPath": path.display().to_string(),
                    "branch": target,
                    "gitStatus": status,
                }),
            )
            .await;
        Ok(())
    }

    pub async fn create_branch(&self, path: &Path, name: &str, from: Option<&str>) -> eyre::Result<()> {
        self.adapter.create_branch(path, name, from).await?;
        let status = self.adapter.status(path).await.unwrap_or_default();
        self.bus
            .publish(
                topics::GIT_BRANCH_CREATED,
                json!({
                    "projectPath": path.display().to_string(),
                    "branch": name,
                    "gitStatus": status,
                }),
            )
            .await;
        Ok(())
    }

    pub async fn compare(&self, path: &Path, a: &str, b: &str) -> eyre::Result<Vec<String>> {
        self.adapter.compare(path, a, b).await
    }
}

pub mod mock {
    //! Scripted git adapter for tests

    use super::*;
    use tokio::sync::Mutex;

    /// Records calls; state is a single mutable current branch
    pub struct MockGitAdapter {
        pub calls: Mutex<Vec<String>>,
        pub current_branch: Mutex<String>,
        pub branches: Vec<String>,
        /// When set, every mutating call fails with this message
        pub fail_with: Option<String>,
    }

    impl Default for MockGitAdapter {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                current_branch: Mutex::new("main".to_string()),
                branches: vec!["main".to_string(), "develop".to_string()],
                fail_with: None,
            }
        }
    }

    impl MockGitAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::default()
            }
        }

        async fn record(&self, call: impl Into<String>) -> eyre::Result<()> {
            self.calls.lock().await.push(call.into());
            match &self.fail_with {
                Some(message) => Err(eyre::eyre!(message.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl GitAdapter for MockGitAdapter {
        async fn status(&self, path: &Path) -> eyre::Result<GitStatus> {
            self.calls.lock().await.push(format!("status:{}", path.display()));
            Ok(GitStatus {
                branch: self.current_branch.lock().await.clone(),
                clean: true,
                ..Default::default()
            })
        }

        async fn branches(&self, _path: &Path) -> eyre::Result<Vec<String>> {
            Ok(self.branches.clone())
        }

        async fn checkout(&self, path: &Path, branch: &str) -> eyre::Result<()> {
            self.record(format!("checkout:{}:{branch}", path.display())).await?;
            *self.current_branch.lock().await = branch.to_string();
            Ok(())
        }

        async fn pull(&self, path: &Path, branch: &str) -> eyre::Result<()> {
            self.record(format!("pull:{}:{branch}", path.display())).await
        }

        async fn merge(&self, path: &Path, source: &str, target: &str) -> eyre::Result<()> {
            self.record(format!("merge:{}:{source}:{target}", path.display())).await
        }

        async fn create_branch(&self, path: &Path, name: &str, from: Option<&str>) -> eyre::Result<()> {
            self.record(format!("create_branch:{}:{name}:{}", path.display(), from.unwrap_or("HEAD")))
                .await
        }

        async fn compare(&self, _path: &Path, _a: &str, _b: &str) -> eyre::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }
}
