//! wd - the workflowd daemon binary
//!
//! Wires the core with loopback collaborator adapters: the real IDE,
//! git and AI adapters attach from their own crates in a deployment;
//! here they echo so the daemon is drivable end to end.

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use workflowd::adapters::{LocalFilesystem, MockAiProvider, MockGitAdapter, MockIdeAdapter};
use workflowd::cli::Cli;
use workflowd::config::Config;
use workflowd::container::ProjectContextPatch;
use workflowd::daemon::{Daemon, DaemonDeps};
use workflowd::events::ClientSink;
use workflowd::project::derive_project_id;

use async_trait::async_trait;
use projectstore::{
    InMemoryAnalysisRepository, InMemoryChatRepository, InMemoryProjectRepository, InMemoryQueueHistoryRepository,
    InMemoryTaskRepository, InMemoryUserSessionRepository,
};
use serde_json::Value;

/// Sink used until a WebSocket server attaches: broadcasts become logs
struct LoggingSink;

#[async_trait]
impl ClientSink for LoggingSink {
    async fn send_to_all(&self, topic: &str, payload: Value) -> Result<()> {
        info!(topic, %payload, "broadcast");
        Ok(())
    }

    async fn send_to_user(&self, user_id: &str, topic: &str, payload: Value) -> Result<()> {
        info!(topic, user_id, %payload, "broadcast");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log.clone())))
        .init();

    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(workflows) = cli.workflows.clone() {
        config.workflows.path = Some(workflows);
    }

    warn!("Collaborator adapters are running in loopback mode");
    let deps = DaemonDeps {
        ide: Arc::new(MockIdeAdapter::new()),
        git: Arc::new(MockGitAdapter::new()),
        ai: Arc::new(MockAiProvider::echoing()),
        fs: Arc::new(LocalFilesystem::new()),
        sink: Arc::new(LoggingSink),
        tasks: Arc::new(InMemoryTaskRepository::new()),
        projects: Arc::new(InMemoryProjectRepository::new()),
        history: Arc::new(InMemoryQueueHistoryRepository::default()),
        analyses: Arc::new(InMemoryAnalysisRepository::new()),
        sessions: Arc::new(InMemoryUserSessionRepository::new()),
        chats: Arc::new(InMemoryChatRepository::new()),
        memory_probe: None,
    };

    let mut daemon = Daemon::build(config, deps)?;

    if let Some(project_root) = &cli.project_root {
        daemon.container().set_project_context(ProjectContextPatch {
            project_path: Some(project_root.clone()),
            project_id: Some(derive_project_id(project_root)),
            workspace_path: Some(project_root.clone()),
        });
    }

    daemon.start().await?;
    info!("wd running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    daemon.stop().await;
    Ok(())
}
