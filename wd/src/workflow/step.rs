//! Step trait and configuration
//!
//! A step is the leaf unit of work. Implementations live behind the
//! `Step` trait; the string-keyed registry exists only at this
//! plugin boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::StepContext;
use super::error::StepError;

/// An executable step
///
/// `execute` receives a clone of the run context (artifacts are shared
/// behind an Arc) and the merged options for this invocation. Long
/// operations must consult `ctx.cancellation` between sub-operations.
#[async_trait]
pub trait Step: Send + Sync {
    async fn execute(&self, ctx: StepContext, options: Value) -> Result<Value, StepError>;
}

/// Metadata recorded at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(rename = "type")]
    pub step_type: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Other step keys this step depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Per-step timeout override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Options merged under the caller's options at execute time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_options: Option<Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl StepConfig {
    pub fn new(category: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            category: category.into(),
            description: String::new(),
            dependencies: Vec::new(),
            version: default_version(),
            timeout_ms: None,
            default_options: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_default_options(mut self, options: Value) -> Self {
        self.default_options = Some(options);
        self
    }
}

/// Merge step options: caller options override the registered defaults
pub fn merge_options(defaults: Option<&Value>, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Some(Value::Object(base)), Value::Object(over)) => {
            let mut merged = base.clone();
            for (k, v) in over {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (Some(base), Value::Null) => base.clone(),
        _ => overrides.clone(),
    }
}
