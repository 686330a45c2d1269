//! WebSocket bridge - mirrors bus topics to connected clients
//!
//! Subscribes once per topic of interest and rebroadcasts through a
//! `ClientSink` capability. Global lifecycle topics go to every
//! connection; IDE and chat lifecycle go only to the owning user.
//! A sink failure is logged and never propagated back to the bus.

use std::sync::Arc;

use async_trait::async_trait;
use projectstore::UserSessionRepository;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::bus::EventBus;
use super::types::topics;

/// Outbound capability implemented by the WebSocket server
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send_to_all(&self, topic: &str, payload: Value) -> eyre::Result<()>;
    async fn send_to_user(&self, user_id: &str, topic: &str, payload: Value) -> eyre::Result<()>;
}

/// Broadcast scope for one wire topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    All,
    PerUser,
}

/// Internal-topic → wire-topic translation table
const TRANSLATION: &[(&str, &str, Scope)] = &[
    (topics::QUEUE_ITEM_ADDED, topics::QUEUE_ITEM_ADDED, Scope::All),
    (topics::QUEUE_ITEM_UPDATED, topics::QUEUE_ITEM_UPDATED, Scope::All),
    (topics::QUEUE_ITEM_COMPLETED, topics::QUEUE_ITEM_COMPLETED, Scope::All),
    (topics::WORKFLOW_STEP_PROGRESS, topics::WORKFLOW_STEP_PROGRESS, Scope::All),
    (topics::WORKFLOW_STEP_COMPLETED, topics::WORKFLOW_STEP_COMPLETED, Scope::All),
    (topics::WORKFLOW_STEP_FAILED, topics::WORKFLOW_STEP_FAILED, Scope::All),
    (topics::GIT_CHECKOUT_COMPLETED, "git-branch-changed", Scope::All),
    (topics::GIT_PULL_COMPLETED, "git-status-updated", Scope::All),
    (topics::GIT_MERGE_COMPLETED, "git-status-updated", Scope::All),
    (topics::GIT_BRANCH_CREATED, "git-status-updated", Scope::All),
    (topics::ANALYSIS_COMPLETED, topics::ANALYSIS_COMPLETED, Scope::All),
    (topics::IDE_STARTED, topics::IDE_STARTED, Scope::PerUser),
    (topics::IDE_STOPPED, topics::IDE_STOPPED, Scope::PerUser),
    (topics::ACTIVE_IDE_CHANGED, topics::ACTIVE_IDE_CHANGED, Scope::All),
    (topics::IDE_LIST_UPDATED, topics::IDE_LIST_UPDATED, Scope::All),
    (topics::CHAT_MESSAGE, "chat-message", Scope::PerUser),
];

/// Bridges the event bus onto WebSocket clients
pub struct WebSocketBridge {
    sink: Arc<dyn ClientSink>,
    sessions: Arc<dyn UserSessionRepository>,
}

impl WebSocketBridge {
    pub fn new(sink: Arc<dyn ClientSink>, sessions: Arc<dyn UserSessionRepository>) -> Self {
        Self { sink, sessions }
    }

    /// Subscribe to every translated topic on the bus
    pub async fn attach(&self, bus: &EventBus) {
        for (internal, wire, scope) in TRANSLATION {
            let sink = self.sink.clone();
            let sessions = self.sessions.clone();
            let wire = *wire;
            let scope = *scope;
            let internal_topic = *internal;

            bus.subscribe(internal_topic, move |event| {
                let sink = sink.clone();
                let sessions = sessions.clone();
                async move {
                    let payload = translate_payload(internal_topic, event.payload);
                    let result = match scope {
                        Scope::All => sink.send_to_all(wire, payload).await,
                        Scope::PerUser => match payload.get("userId").and_then(|v| v.as_str()) {
                            Some(user_id) => {
                                // Only users with a live session get
                                // their scoped events
                                let user_id = user_id.to_string();
                                if sessions.sessions_for_user(&user_id).await.is_empty() {
                                    debug!(topic = internal_topic, %user_id, "No session, per-user event dropped");
                                    Ok(())
                                } else {
                                    sink.send_to_user(&user_id, wire, payload).await
                                }
                            }
                            None => {
                                debug!(topic = internal_topic, "Per-user event without userId, dropped");
                                Ok(())
                            }
                        },
                    };
                    if let Err(e) = result {
                        warn!(topic = wire, error = %e, "WebSocket broadcast failed");
                    }
                    Ok(())
                }
            })
            .await;
        }
        debug!(topics = TRANSLATION.len(), "WebSocketBridge attached");
    }
}

/// Reshape payloads where the wire contract differs from the bus one
fn translate_payload(internal_topic: &str, payload: Value) -> Value {
    match internal_topic {
        topics::GIT_CHECKOUT_COMPLETED => json!({
            "workspacePath": payload.get("projectPath").cloned().unwrap_or(Value::Null),
            "newBranch": payload.get("branch").cloned().unwrap_or(Value::Null),
        }),
        topics::GIT_PULL_COMPLETED | topics::GIT_MERGE_COMPLETED | topics::GIT_BRANCH_CREATED => json!({
            "workspacePath": payload.get("projectPath").cloned().unwrap_or(Value::Null),
            "gitStatus": payload.get("gitStatus").cloned().unwrap_or(Value::Null),
        }),
        _ => payload,
    }
}

pub mod mock {
    //! Recording sink for tests

    use super::*;
    use tokio::sync::Mutex;

    /// Records every broadcast for assertions
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<(Option<String>, String, Value)>>,
    }

    #[async_trait]
    impl ClientSink for RecordingSink {
        async fn send_to_all(&self, topic: &str, payload: Value) -> eyre::Result<()> {
            self.sent.lock().await.push((None, topic.to_string(), payload));
            Ok(())
        }

        async fn send_to_user(&self, user_id: &str, topic: &str, payload: Value) -> eyre::Result<()> {
            self.sent
                .lock()
                .await
                .push((Some(user_id.to_string()), topic.to_string(), payload));
            Ok(())
        }
    }
}
