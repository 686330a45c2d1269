//! Project context view shared through the container
//!
//! Any service may read the current `{project_path, project_id,
//! workspace_path}`; writes funnel through `set_project_context`
//! so there is exactly one mutation path.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Read-only snapshot of the active project context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContextView {
    pub project_path: Option<PathBuf>,
    pub project_id: Option<String>,
    pub workspace_path: Option<PathBuf>,
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct ProjectContextPatch {
    pub project_path: Option<PathBuf>,
    pub project_id: Option<String>,
    pub workspace_path: Option<PathBuf>,
}

impl ProjectContextView {
    /// Apply a patch, returning the updated view
    pub fn apply(&self, patch: ProjectContextPatch) -> Self {
        Self {
            project_path: patch.project_path.or_else(|| self.project_path.clone()),
            project_id: patch.project_id.or_else(|| self.project_id.clone()),
            workspace_path: patch.workspace_path.or_else(|| self.workspace_path.clone()),
        }
    }
}
