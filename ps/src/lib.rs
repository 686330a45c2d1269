//! ProjectStore - domain entities and repository contracts for workflowd
//!
//! The core never touches raw rows: every repository returns domain
//! entities (or `None`). The implementations in this crate are
//! in-memory; queue state is deliberately not persisted, and a swap to
//! a SQL-backed implementation only has to honor the same contracts.
//!
//! # Modules
//!
//! - [`task`] - Task entity and `TaskRepository`
//! - [`project`] - Project cache rows and `ProjectRepository`
//! - [`analysis`] - Analysis result rows and `AnalysisRepository`
//! - [`history`] - Bounded per-project queue history
//! - [`session`] - User session lookups for per-user broadcast scoping
//! - [`chat`] - Chat message persistence contract

pub mod analysis;
pub mod chat;
pub mod error;
pub mod history;
pub mod priority;
pub mod project;
pub mod session;
pub mod task;

pub use analysis::{AnalysisRecord, AnalysisRepository, AnalysisState, InMemoryAnalysisRepository};
pub use chat::{ChatMessage, ChatRepository, InMemoryChatRepository};
pub use error::StoreError;
pub use history::{InMemoryQueueHistoryRepository, QueueHistoryEntry, QueueHistoryRepository};
pub use priority::Priority;
pub use project::{InMemoryProjectRepository, Project, ProjectRepository, ProjectType};
pub use session::{InMemoryUserSessionRepository, UserSession, UserSessionRepository};
pub use task::{InMemoryTaskRepository, Task, TaskRepository, TaskStatus};
