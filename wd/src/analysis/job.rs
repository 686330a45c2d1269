//! Analysis job model

use chrono::{DateTime, Utc};
use projectstore::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

pub use projectstore::AnalysisState;

/// The fixed set of analysis types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisType {
    CodeQuality,
    Security,
    Performance,
    Architecture,
    Techstack,
    Recommendations,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 6] = [
        AnalysisType::CodeQuality,
        AnalysisType::Security,
        AnalysisType::Performance,
        AnalysisType::Architecture,
        AnalysisType::Techstack,
        AnalysisType::Recommendations,
    ];
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CodeQuality => "code-quality",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Architecture => "architecture",
            Self::Techstack => "techstack",
            Self::Recommendations => "recommendations",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code-quality" => Ok(Self::CodeQuality),
            "security" => Ok(Self::Security),
            "performance" => Ok(Self::Performance),
            "architecture" => Ok(Self::Architecture),
            "techstack" => Ok(Self::Techstack),
            "recommendations" => Ok(Self::Recommendations),
            _ => Err(format!("Unknown analysis type: {}", s)),
        }
    }
}

/// Why a job ended partial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialReason {
    Timeout,
    Memory,
    Cancelled,
}

impl std::fmt::Display for PartialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Memory => "memory",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One admission into the analysis queue
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub job_id: String,
    pub project_id: String,
    pub project_path: PathBuf,
    pub types: Vec<AnalysisType>,
    pub priority: Priority,
    pub timeout_ms: u64,
    pub memory_budget_bytes: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(
        project_id: impl Into<String>,
        project_path: impl Into<PathBuf>,
        types: Vec<AnalysisType>,
        priority: Priority,
        timeout_ms: u64,
        memory_budget_bytes: u64,
    ) -> Self {
        Self {
            job_id: Uuid::now_v7().to_string(),
            project_id: project_id.into(),
            project_path: project_path.into(),
            types,
            priority,
            timeout_ms,
            memory_budget_bytes,
            enqueued_at: Utc::now(),
        }
    }
}

/// Synchronous answer to an analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSubmission {
    pub job_id: String,
    pub state: AnalysisState,
    /// 1 = started (or next); grows down the waiting line
    pub position: usize,
    pub estimated_wait_ms: u64,
}

/// Final shape of a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub job_id: String,
    pub project_id: String,
    pub state: AnalysisState,
    pub results: HashMap<String, Value>,
    pub reason: Option<PartialReason>,
    pub fallback_triggers: u32,
    pub violations: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serde_kebab() {
        assert_eq!(serde_json::to_string(&AnalysisType::CodeQuality).unwrap(), "\"code-quality\"");
        let t: AnalysisType = serde_json::from_str("\"techstack\"").unwrap();
        assert_eq!(t, AnalysisType::Techstack);
    }

    #[test]
    fn test_type_parse_roundtrip() {
        for t in AnalysisType::ALL {
            assert_eq!(t.to_string().parse::<AnalysisType>().unwrap(), t);
        }
        assert!("quality".parse::<AnalysisType>().is_err());
    }

    #[test]
    fn test_partial_reason_display() {
        assert_eq!(PartialReason::Memory.to_string(), "memory");
        assert_eq!(PartialReason::Timeout.to_string(), "timeout");
    }
}
