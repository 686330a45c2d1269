//! Daemon configuration types and loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisConfig;
use crate::queue::{QueueConfig, RetryPolicy};

/// Main workflowd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task queue limits
    pub queue: QueueConfig,

    /// Analysis queue limits
    pub analysis: AnalysisConfig,

    /// Worker loop tuning
    pub processor: ProcessorSettings,

    /// Retry policy shared by the processor and analysis paths
    pub retry: RetrySettings,

    /// Workflow definition sources
    pub workflows: WorkflowsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".workflowd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("workflowd").join("workflowd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Worker loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    /// Shutdown grace period in milliseconds
    #[serde(rename = "shutdown-grace-ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 30_000,
        }
    }
}

/// Retry tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff before each retry, milliseconds; the last entry repeats
    #[serde(rename = "backoff-ms")]
    pub backoff_ms: Vec<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: vec![500, 2_000],
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_schedule: self.backoff_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }
}

/// Workflow definition sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// Workflow JSON file; the embedded defaults are used when absent
    pub path: Option<PathBuf>,

    /// Framework plug-in directories, each holding a manifest.json
    #[serde(rename = "framework-dirs")]
    pub framework_dirs: Vec<PathBuf>,
}
