//! Per-run step context and cooperative cancellation
//!
//! One `StepContext` is constructed per workflow run and shared across
//! all of its steps. Steps communicate forward through the add-only
//! `artifacts` map; cancellation is delivered through the token and
//! consulted by long-running steps between sub-operations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, watch};

use crate::container::ServiceContainer;

use super::error::StepError;

/// Cooperative cancellation token
///
/// `cancel` flips the flag and wakes waiters; it never terminates
/// anything by force. An operation that ignores the token runs to
/// completion and its result is discarded by the caller. A child
/// token observes its parent's cancellation but cancels independently.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parent: None,
        }
    }

    /// Request cancellation; idempotent, non-blocking
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() || self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    /// Resolves once cancellation has been requested on this token or
    /// any ancestor
    pub fn cancelled(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.is_cancelled() {
                return;
            }
            let mut rx = self.tx.subscribe();
            let own = async move {
                loop {
                    if *rx.borrow() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Sender kept alive by self; unreachable
                        std::future::pending::<()>().await;
                    }
                }
            };
            match &self.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        })
    }

    /// Derive a token that is cancelled when either this token is
    /// cancelled or `cancel` is called on the child directly
    pub fn child(&self) -> CancelToken {
        let (tx, _) = watch::channel(false);
        CancelToken {
            tx: Arc::new(tx),
            parent: Some(Arc::new(self.clone())),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution context threaded through every step of one workflow run
#[derive(Clone)]
pub struct StepContext {
    pub project_id: String,
    pub project_path: PathBuf,
    pub user_id: String,
    pub task_id: Option<String>,
    pub workflow_id: Option<String>,
    pub services: Arc<ServiceContainer>,
    pub cancellation: CancelToken,
    /// Step key -> returned artifact; add-only
    artifacts: Arc<Mutex<HashMap<String, Value>>>,
}

impl StepContext {
    pub fn new(
        project_id: impl Into<String>,
        project_path: impl Into<PathBuf>,
        user_id: impl Into<String>,
        services: Arc<ServiceContainer>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            project_path: project_path.into(),
            user_id: user_id.into(),
            task_id: None,
            workflow_id: None,
            services,
            cancellation: CancelToken::new(),
            artifacts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Record a step's artifact; keys are write-once
    pub async fn insert_artifact(&self, key: &str, value: Value) -> Result<(), StepError> {
        let mut artifacts = self.artifacts.lock().await;
        if artifacts.contains_key(key) {
            return Err(StepError::ArtifactOverwrite { key: key.to_string() });
        }
        artifacts.insert(key.to_string(), value);
        Ok(())
    }

    pub async fn artifact(&self, key: &str) -> Option<Value> {
        self.artifacts.lock().await.get(key).cloned()
    }

    pub async fn artifacts(&self) -> HashMap<String, Value> {
        self.artifacts.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn context() -> StepContext {
        StepContext::new("proj", "/work/proj", "alice", Arc::new(ServiceContainer::new()))
    }

    #[tokio::test]
    async fn test_artifacts_add_only() {
        let ctx = context();
        ctx.insert_artifact("git.checkout", json!({"branch": "main"})).await.unwrap();

        let err = ctx.insert_artifact("git.checkout", json!({})).await.unwrap_err();
        assert!(matches!(err, StepError::ArtifactOverwrite { .. }));

        // Original value untouched
        assert_eq!(ctx.artifact("git.checkout").await.unwrap()["branch"], "main");
    }

    #[tokio::test]
    async fn test_artifacts_shared_across_clones() {
        let ctx = context();
        let clone = ctx.clone();
        clone.insert_artifact("a", json!(1)).await.unwrap();
        assert_eq!(ctx.artifact("a").await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_cancel_token_flag() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        // Waiting after the fact resolves immediately
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let woke = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(woke);
    }

    #[tokio::test]
    async fn test_child_token_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child();

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled()).await.unwrap();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_parent() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
