//! Project root auto-detection
//!
//! Monorepo-aware: a working directory named like a monorepo subdir
//! (`backend`, `frontend`, ...) whose parent holds at least two such
//! subdirs and a workspace indicator resolves to the parent. A
//! directory carrying a project indicator of its own is a single
//! repo. Otherwise the walk retries one level up. Detection is a pure
//! function of the filesystem, so repeat runs agree.

use std::path::{Path, PathBuf};

use projectstore::ProjectType;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Subdirectory names that suggest a monorepo member
pub const MONOREPO_SUBDIRS: &[&str] = &[
    "backend", "frontend", "client", "server", "api", "app", "web", "mobile",
];

/// Files/directories that mark a workspace root
pub const ROOT_INDICATORS: &[&str] = &[
    "package.json",
    ".git",
    "lerna.json",
    "nx.json",
    "pnpm-workspace.yaml",
    "turbo.json",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
];

/// Detection failures
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("No project root found at or above {0}")]
    NotFound(PathBuf),
}

/// A resolved root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub project_path: PathBuf,
    pub project_type: ProjectType,
}

/// Walk upward from `start` until a root is found
pub fn detect_project_root(start: &Path) -> Result<Detection, DetectError> {
    let mut current = start.to_path_buf();

    loop {
        if let Some(detection) = monorepo_parent(&current) {
            debug!(path = %detection.project_path.display(), "Detected monorepo root");
            return Ok(detection);
        }

        if has_indicator(&current) {
            debug!(path = %current.display(), "Detected single-repo root");
            return Ok(Detection {
                project_path: current,
                project_type: ProjectType::SingleRepo,
            });
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return Err(DetectError::NotFound(start.to_path_buf())),
        }
    }
}

/// Derive a project id: lowercase basename with non-alphanumeric runs
/// collapsed to `_`
pub fn derive_project_id(project_path: &Path) -> String {
    let basename = project_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let mut id = String::with_capacity(basename.len());
    let mut last_was_sep = false;
    for c in basename.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !id.is_empty() {
            id.push('_');
            last_was_sep = true;
        }
    }
    let id = id.trim_end_matches('_').to_string();
    if id.is_empty() { "project".to_string() } else { id }
}

fn monorepo_parent(current: &Path) -> Option<Detection> {
    let name = current.file_name()?.to_str()?;
    if !MONOREPO_SUBDIRS.contains(&name) {
        return None;
    }
    let parent = current.parent()?;

    let sibling_count = WalkDir::new(parent)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|n| MONOREPO_SUBDIRS.contains(&n))
                .unwrap_or(false)
        })
        .count();

    if sibling_count >= 2 && has_indicator(parent) {
        Some(Detection {
            project_path: parent.to_path_buf(),
            project_type: ProjectType::Monorepo,
        })
    } else {
        None
    }
}

fn has_indicator(dir: &Path) -> bool {
    ROOT_INDICATORS.iter().any(|indicator| dir.join(indicator).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_monorepo_detection() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("workspace");
        fs::create_dir_all(root.join("backend")).unwrap();
        fs::create_dir_all(root.join("frontend")).unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();

        let detection = detect_project_root(&root.join("backend")).unwrap();
        assert_eq!(detection.project_path, root);
        assert_eq!(detection.project_type, ProjectType::Monorepo);
    }

    #[test]
    fn test_monorepo_needs_two_subdirs() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("workspace");
        fs::create_dir_all(root.join("backend")).unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        // Only one monorepo subdir: backend itself is not a root, and
        // the parent carries the indicator, so the parent wins as a
        // single repo
        let detection = detect_project_root(&root.join("backend")).unwrap();
        assert_eq!(detection.project_path, root);
        assert_eq!(detection.project_type, ProjectType::SingleRepo);
    }

    #[test]
    fn test_single_repo_detection() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("myapp");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("Cargo.toml"), "[package]").unwrap();

        // From a nested dir the walk climbs to the indicator
        let detection = detect_project_root(&root.join("src")).unwrap();
        assert_eq!(detection.project_path, root);
        assert_eq!(detection.project_type, ProjectType::SingleRepo);
    }

    #[test]
    fn test_subdir_with_own_indicator_is_its_own_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("workspace");
        fs::create_dir_all(root.join("backend")).unwrap();
        fs::write(root.join("backend/package.json"), "{}").unwrap();

        // Parent has no indicator and only one subdir: backend stands alone
        let detection = detect_project_root(&root.join("backend")).unwrap();
        assert_eq!(detection.project_path, root.join("backend"));
        assert_eq!(detection.project_type, ProjectType::SingleRepo);
    }

    #[test]
    fn test_detection_stable() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("app");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("go.mod"), "module app").unwrap();

        let first = detect_project_root(&root).unwrap();
        let second = detect_project_root(&root).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nothing_found() {
        let temp = tempdir().unwrap();
        let bare = temp.path().join("empty");
        fs::create_dir_all(&bare).unwrap();

        // May still find an indicator in an ancestor of the tempdir
        // (e.g. a .git above /tmp); only assert it does not panic and,
        // when it fails, reports the start path
        if let Err(DetectError::NotFound(path)) = detect_project_root(&bare) {
            assert_eq!(path, bare);
        }
    }

    #[test]
    fn test_derive_project_id() {
        assert_eq!(derive_project_id(Path::new("/work/My App")), "my_app");
        assert_eq!(derive_project_id(Path::new("/work/api-server-2")), "api_server_2");
        assert_eq!(derive_project_id(Path::new("/work/---")), "project");
        assert_eq!(derive_project_id(Path::new("/work/app..staging")), "app_staging");
    }
}
