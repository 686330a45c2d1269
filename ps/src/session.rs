//! User sessions for per-user broadcast scoping

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An authenticated client session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Session lookup contract
#[async_trait]
pub trait UserSessionRepository: Send + Sync {
    async fn save(&self, session: UserSession);
    async fn find_by_session_id(&self, session_id: &str) -> Option<UserSession>;
    async fn sessions_for_user(&self, user_id: &str) -> Vec<UserSession>;
    async fn remove(&self, session_id: &str);
}

/// In-memory session repository
#[derive(Default)]
pub struct InMemoryUserSessionRepository {
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl InMemoryUserSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserSessionRepository for InMemoryUserSessionRepository {
    async fn save(&self, session: UserSession) {
        self.sessions.write().await.insert(session.session_id.clone(), session);
    }

    async fn find_by_session_id(&self, session_id: &str) -> Option<UserSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn sessions_for_user(&self, user_id: &str) -> Vec<UserSession> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}
