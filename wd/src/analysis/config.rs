//! Analysis configuration and per-type timeout table

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::job::AnalysisType;

/// Analysis queue and scanner limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Memory budget per analysis run, bytes
    #[serde(rename = "max-memory-per-analysis")]
    pub max_memory_per_analysis: u64,

    /// Whole-job timeout, milliseconds
    #[serde(rename = "analysis-timeout-ms")]
    pub analysis_timeout_ms: u64,

    #[serde(rename = "max-concurrent-per-project")]
    pub max_concurrent_per_project: usize,

    /// Heap ratio that triggers progressive degradation
    #[serde(rename = "memory-threshold")]
    pub memory_threshold: f64,

    /// Files per streamed batch
    #[serde(rename = "streaming-batch-size")]
    pub streaming_batch_size: usize,

    /// Directory names skipped during scans
    #[serde(rename = "exclude-dirs")]
    pub exclude_dirs: Vec<String>,

    /// Files above this size are skipped with a violation, bytes
    #[serde(rename = "max-file-size")]
    pub max_file_size: u64,

    #[serde(rename = "max-directory-depth")]
    pub max_directory_depth: usize,

    /// Per-chunk read buffer, bytes
    #[serde(rename = "chunk-buffer")]
    pub chunk_buffer: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_memory_per_analysis: 512 * 1024 * 1024,
            analysis_timeout_ms: 5 * 60 * 1000,
            max_concurrent_per_project: 3,
            memory_threshold: 0.8,
            streaming_batch_size: 100,
            exclude_dirs: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "dist".to_string(),
                "build".to_string(),
                "coverage".to_string(),
            ],
            max_file_size: 10 * 1024 * 1024,
            max_directory_depth: 8,
            chunk_buffer: 64 * 1024,
        }
    }
}

impl AnalysisConfig {
    /// Per-type execution deadline
    pub fn type_timeout(&self, analysis_type: AnalysisType) -> Duration {
        let secs = match analysis_type {
            AnalysisType::CodeQuality => 120,
            AnalysisType::Security => 180,
            AnalysisType::Performance => 240,
            AnalysisType::Architecture => 300,
            AnalysisType::Techstack => 120,
            AnalysisType::Recommendations => 60,
        };
        Duration::from_secs(secs)
    }
}
