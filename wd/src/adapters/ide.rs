//! IDE control adapter capability
//!
//! The daemon drives Cursor/VSCode/Windsurf instances through a
//! browser debug protocol; this trait is the whole surface the core
//! needs. The real implementation lives outside the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A running IDE instance reachable on a debug port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeInfo {
    pub port: u16,
    /// "cursor", "vscode", "windsurf"
    pub ide_type: String,
    pub workspace_path: Option<String>,
}

/// Capability set for controlling an IDE instance
#[async_trait]
pub trait IdeAdapter: Send + Sync {
    async fn connect(&self, port: u16) -> eyre::Result<()>;
    async fn send_message(&self, port: u16, text: &str) -> eyre::Result<()>;
    async fn click_new_chat(&self, port: u16) -> eyre::Result<()>;
    async fn get_file_tree(&self, port: u16) -> eyre::Result<Value>;
    async fn get_file_content(&self, port: u16, path: &str) -> eyre::Result<String>;
    async fn execute_terminal(&self, port: u16, cmd: &str) -> eyre::Result<String>;
    async fn set_workspace(&self, port: u16, path: &str) -> eyre::Result<()>;
    async fn get_active_port(&self) -> Option<u16>;
    async fn list_ides(&self) -> eyre::Result<Vec<IdeInfo>>;
}

pub mod mock {
    //! Recording IDE adapter for tests

    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    /// Records every call; messages are accepted, lookups return
    /// the configured fixtures.
    pub struct MockIdeAdapter {
        pub calls: Mutex<Vec<String>>,
        pub active_port: Option<u16>,
        pub ides: Vec<IdeInfo>,
    }

    impl Default for MockIdeAdapter {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                active_port: Some(9222),
                ides: vec![IdeInfo {
                    port: 9222,
                    ide_type: "cursor".to_string(),
                    workspace_path: Some("/work/app".to_string()),
                }],
            }
        }
    }

    impl MockIdeAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        async fn record(&self, call: impl Into<String>) {
            self.calls.lock().await.push(call.into());
        }
    }

    #[async_trait]
    impl IdeAdapter for MockIdeAdapter {
        async fn connect(&self, port: u16) -> eyre::Result<()> {
            self.record(format!("connect:{port}")).await;
            Ok(())
        }

        async fn send_message(&self, port: u16, text: &str) -> eyre::Result<()> {
            self.record(format!("send_message:{port}:{text}")).await;
            Ok(())
        }

        async fn click_new_chat(&self, port: u16) -> eyre::Result<()> {
            self.record(format!("click_new_chat:{port}")).await;
            Ok(())
        }

        async fn get_file_tree(&self, port: u16) -> eyre::Result<Value> {
            self.record(format!("get_file_tree:{port}")).await;
            Ok(json!({ "root": [] }))
        }

        async fn get_file_content(&self, port: u16, path: &str) -> eyre::Result<String> {
            self.record(format!("get_file_content:{port}:{path}")).await;
            Ok(String::new())
        }

        async fn execute_terminal(&self, port: u16, cmd: &str) -> eyre::Result<String> {
            self.record(format!("execute_terminal:{port}:{cmd}")).await;
            Ok(String::new())
        }

        async fn set_workspace(&self, port: u16, path: &str) -> eyre::Result<()> {
            self.record(format!("set_workspace:{port}:{path}")).await;
            Ok(())
        }

        async fn get_active_port(&self) -> Option<u16> {
            self.active_port
        }

        async fn list_ides(&self) -> eyre::Result<Vec<IdeInfo>> {
            Ok(self.ides.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockIdeAdapter;
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let ide = MockIdeAdapter::new();
        ide.connect(9222).await.unwrap();
        ide.send_message(9222, "hello").await.unwrap();

        let calls = ide.calls.lock().await;
        assert_eq!(calls.as_slice(), ["connect:9222", "send_message:9222:hello"]);
    }

    #[tokio::test]
    async fn test_mock_lists_fixture_ides() {
        let ide = MockIdeAdapter::new();
        let ides = ide.list_ides().await.unwrap();
        assert_eq!(ides.len(), 1);
        assert_eq!(ides[0].ide_type, "cursor");
        assert_eq!(ide.get_active_port().await, Some(9222));
    }
}
