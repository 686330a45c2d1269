//! Project context service - detection + cache + container view
//!
//! Resolution precedence: explicit override in the container view,
//! then the project-repository cache keyed by the starting directory,
//! then a live auto-detect whose result is cached for next time.

use std::path::Path;
use std::sync::Arc;

use projectstore::{Project, ProjectRepository, ProjectType};
use tracing::{debug, info};

use crate::container::{ProjectContextPatch, ServiceContainer};

use super::detector::{DetectError, derive_project_id, detect_project_root};

/// Resolved project identity handed to the rest of the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProject {
    pub project_id: String,
    pub project_path: std::path::PathBuf,
    pub project_type: ProjectType,
}

/// Supplies `{projectId, projectPath}` to all components
pub struct ProjectContextService {
    repo: Arc<dyn ProjectRepository>,
    container: Arc<ServiceContainer>,
}

impl ProjectContextService {
    pub fn new(repo: Arc<dyn ProjectRepository>, container: Arc<ServiceContainer>) -> Self {
        Self { repo, container }
    }

    /// Resolve the project for `cwd` and mirror it into the container
    pub async fn resolve(&self, cwd: &Path) -> Result<ResolvedProject, DetectError> {
        // 1. Explicit override wins
        let view = self.container.project_context();
        if let (Some(project_path), Some(project_id)) = (view.project_path.clone(), view.project_id.clone()) {
            debug!(%project_id, "Project context from explicit override");
            return Ok(ResolvedProject {
                project_id,
                project_path,
                project_type: ProjectType::SingleRepo,
            });
        }

        // 2. Cache keyed by the starting directory
        if let Some(cached) = self.repo.find_by_workspace_path(cwd).await {
            debug!(project_id = %cached.id, "Project context from cache");
            let resolved = ResolvedProject {
                project_id: cached.id,
                project_path: cached.metadata
                    .get("resolvedRoot")
                    .and_then(|v| v.as_str())
                    .map(Into::into)
                    .unwrap_or(cached.workspace_path),
                project_type: cached.project_type,
            };
            self.mirror(&resolved);
            return Ok(resolved);
        }

        // 3. Live detection, cached for next time
        let detection = detect_project_root(cwd)?;
        let project_id = derive_project_id(&detection.project_path);

        let mut candidate = Project::new(project_id.clone(), &detection.project_path, detection.project_type);
        candidate.metadata = serde_json::json!({
            "resolvedRoot": detection.project_path.display().to_string(),
        });
        let _ = self.repo.find_or_create_by_workspace_path(cwd, candidate).await;

        info!(
            %project_id,
            path = %detection.project_path.display(),
            kind = %detection.project_type,
            "Detected project root"
        );

        let resolved = ResolvedProject {
            project_id,
            project_path: detection.project_path,
            project_type: detection.project_type,
        };
        self.mirror(&resolved);
        Ok(resolved)
    }

    fn mirror(&self, resolved: &ResolvedProject) {
        self.container.set_project_context(ProjectContextPatch {
            project_path: Some(resolved.project_path.clone()),
            project_id: Some(resolved.project_id.clone()),
            workspace_path: Some(resolved.project_path.clone()),
        });
    }
}
