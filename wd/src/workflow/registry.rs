//! Step registry - holds step definitions keyed by `category.name`
//!
//! Registration validates key uniqueness and keeps the dependency
//! graph acyclic. Framework plug-ins register through a manifest; each
//! manifest step maps onto an already-registered base executor under a
//! `<framework>.<step>` key.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::StepError;
use super::step::{Step, StepConfig};

/// A registered step with its metadata
#[derive(Clone)]
pub struct RegisteredStep {
    pub key: String,
    pub config: StepConfig,
    pub executor: Arc<dyn Step>,
}

/// Registry of executable steps
pub struct StepRegistry {
    steps: RwLock<HashMap<String, RegisteredStep>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: RwLock::new(HashMap::new()),
        }
    }

    /// Register a step under a unique key
    ///
    /// Dependencies may reference keys registered later; the graph
    /// over currently-known keys must stay acyclic.
    pub fn register_step(&self, key: &str, config: StepConfig, executor: Arc<dyn Step>) -> Result<(), StepError> {
        let mut steps = self.steps.write().unwrap();
        if steps.contains_key(key) {
            return Err(StepError::Duplicate(key.to_string()));
        }

        steps.insert(
            key.to_string(),
            RegisteredStep {
                key: key.to_string(),
                config,
                executor,
            },
        );

        if let Some(chain) = find_cycle(&steps, key) {
            steps.remove(key);
            return Err(StepError::DependencyCycle { chain });
        }

        debug!(key, "StepRegistry::register_step");
        Ok(())
    }

    /// Look up a registered step
    pub fn get(&self, key: &str) -> Result<RegisteredStep, StepError> {
        self.steps
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StepError::NotRegistered(key.to_string()))
    }

    pub fn has_step(&self, key: &str) -> bool {
        self.steps.read().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.steps.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys whose declared dependencies are not registered (yet)
    pub fn unresolved_dependencies(&self) -> Vec<(String, String)> {
        let steps = self.steps.read().unwrap();
        let mut missing = Vec::new();
        for (key, step) in steps.iter() {
            for dep in &step.config.dependencies {
                if !steps.contains_key(dep) {
                    missing.push((key.clone(), dep.clone()));
                }
            }
        }
        missing.sort();
        missing
    }

    /// Load a framework plug-in directory
    ///
    /// Discovery is: read `manifest.json` → validate each declared
    /// step → register it under `<framework>.<name>`. A manifest step
    /// references a registered base executor and may carry default
    /// options merged under the caller's at execute time.
    pub fn load_framework(&self, dir: &Path) -> Result<Vec<String>, StepError> {
        let manifest_path = dir.join("manifest.json");
        let content = fs::read_to_string(&manifest_path).map_err(|e| StepError::Manifest {
            path: manifest_path.display().to_string(),
            message: e.to_string(),
        })?;
        let manifest: FrameworkManifest = serde_json::from_str(&content).map_err(|e| StepError::Manifest {
            path: manifest_path.display().to_string(),
            message: e.to_string(),
        })?;

        if manifest.name.is_empty() {
            return Err(StepError::Manifest {
                path: manifest_path.display().to_string(),
                message: "framework name is empty".to_string(),
            });
        }

        let mut registered = Vec::new();
        for step in &manifest.steps {
            let base = self.get(&step.base)?;
            let key = format!("{}.{}", manifest.name, step.name);

            let mut config = StepConfig::new(manifest.name.clone(), base.config.step_type.clone())
                .with_description(step.description.clone().unwrap_or_else(|| base.config.description.clone()));
            config.version = manifest.version.clone();
            config.timeout_ms = step.timeout_ms.or(base.config.timeout_ms);
            config.default_options = match (&base.config.default_options, &step.options) {
                (_, Some(options)) => Some(super::step::merge_options(
                    base.config.default_options.as_ref(),
                    options,
                )),
                (Some(base_options), None) => Some(base_options.clone()),
                (None, None) => None,
            };

            match self.register_step(&key, config, base.executor.clone()) {
                Ok(()) => registered.push(key),
                Err(StepError::Duplicate(key)) => {
                    warn!(%key, "Framework step already registered, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        info!(framework = %manifest.name, steps = registered.len(), "Loaded framework");
        Ok(registered)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Framework plug-in manifest shape
#[derive(Debug, Deserialize)]
struct FrameworkManifest {
    name: String,
    #[serde(default = "default_manifest_version")]
    version: String,
    #[serde(default)]
    steps: Vec<ManifestStep>,
}

fn default_manifest_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Deserialize)]
struct ManifestStep {
    name: String,
    /// Key of the registered base executor this step maps onto
    base: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Find a dependency cycle reachable from `start`, if any
fn find_cycle(steps: &HashMap<String, RegisteredStep>, start: &str) -> Option<Vec<String>> {
    fn visit(
        steps: &HashMap<String, RegisteredStep>,
        name: &str,
        stack: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if stack.iter().any(|n| n == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Some(chain);
        }
        if visited.contains(name) {
            return None;
        }
        let Some(step) = steps.get(name) else {
            // Pending dependency; checked again when it registers
            return None;
        };
        stack.push(name.to_string());
        for dep in &step.config.dependencies {
            if let Some(chain) = visit(steps, dep, stack, visited) {
                return Some(chain);
            }
        }
        stack.pop();
        visited.insert(name.to_string());
        None
    }

    visit(steps, start, &mut Vec::new(), &mut HashSet::new())
}
