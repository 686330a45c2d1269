//! Queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-project queue limits and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queued + paused + running per project
    #[serde(rename = "max-size")]
    pub max_size: usize,

    #[serde(rename = "max-concurrent-per-project")]
    pub max_concurrent_per_project: usize,

    /// Per-item execution timeout in milliseconds
    #[serde(rename = "default-timeout-ms")]
    pub default_timeout_ms: u64,

    /// Executions per item (first run included)
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Wait estimate per queued slot when no average is known yet
    #[serde(rename = "default-eta-ms")]
    pub default_eta_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_concurrent_per_project: 3,
            default_timeout_ms: 5 * 60 * 1000,
            max_attempts: 2,
            default_eta_ms: 3 * 60 * 1000,
        }
    }
}

impl QueueConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.max_concurrent_per_project, 3);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.default_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: QueueConfig = serde_yaml::from_str("max-size: 4").unwrap();
        assert_eq!(config.max_size, 4);
        assert_eq!(config.max_concurrent_per_project, 3);
    }
}
