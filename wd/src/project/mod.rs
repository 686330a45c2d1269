//! Project identity: root detection and the context service

mod context;
mod detector;

pub use context::{ProjectContextService, ResolvedProject};
pub use detector::{
    Detection, DetectError, MONOREPO_SUBDIRS, ROOT_INDICATORS, derive_project_id, detect_project_root,
};
