//! Workflow loader - declarative workflow JSON with inheritance
//!
//! The workflow file carries three maps: workflow definitions (with
//! optional `extends`), a task-type → workflow-id mapping, and named
//! prompt templates. Inheritance is resolved lazily per lookup; the
//! parent's steps precede the child's and cycles are fatal.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::error::WorkflowError;

/// One step entry in a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl StepEntry {
    /// Registry key for this entry; the category defaults to the type
    pub fn key(&self) -> String {
        let category = self.category.as_deref().unwrap_or(&self.step_type);
        format!("{}.{}", category, self.name)
    }
}

/// A workflow definition as written in the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

/// A workflow with inheritance flattened
#[derive(Debug, Clone)]
pub struct ResolvedWorkflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<StepEntry>,
}

/// File shape (see the workflows JSON contract)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkflowFile {
    #[serde(default)]
    workflows: HashMap<String, WorkflowDef>,
    #[serde(default, rename = "taskTypeMapping")]
    task_type_mapping: HashMap<String, String>,
    #[serde(default)]
    prompts: HashMap<String, String>,
}

/// Stock definitions embedded in the binary
const DEFAULT_WORKFLOWS: &str = include_str!("default_workflows.json");

/// Loads and serves declarative workflow definitions
#[derive(Debug)]
pub struct WorkflowLoader {
    workflows: HashMap<String, WorkflowDef>,
    task_type_mapping: HashMap<String, String>,
    prompts: HashMap<String, String>,
}

impl WorkflowLoader {
    /// The embedded stock workflows, used when no file is configured
    pub fn embedded_defaults() -> Result<Self, serde_json::Error> {
        Self::from_json(DEFAULT_WORKFLOWS)
    }

    /// Load the workflow file from disk
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let content = fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let loader = Self::from_json(&content).map_err(|source| WorkflowError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(
            path = %path.display(),
            workflows = loader.workflows.len(),
            prompts = loader.prompts.len(),
            "Loaded workflow definitions"
        );
        Ok(loader)
    }

    /// Parse from a JSON string (used by tests and embedded defaults)
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: WorkflowFile = serde_json::from_str(content)?;
        Ok(Self {
            workflows: file.workflows,
            task_type_mapping: file.task_type_mapping,
            prompts: file.prompts,
        })
    }

    /// Resolve a workflow, walking `extends` parents on demand
    ///
    /// The flattening is idempotent: resolving an already-flat
    /// workflow returns the same steps.
    pub fn get_workflow(&self, id: &str) -> Result<ResolvedWorkflow, WorkflowError> {
        let mut chain = Vec::new();
        let mut steps = Vec::new();

        // Walk child -> parent, then lay parent steps down first
        let mut current = id;
        loop {
            if chain.iter().any(|c| c == current) {
                let mut cycle = chain.clone();
                cycle.push(current.to_string());
                return Err(WorkflowError::InheritanceCycle { chain: cycle });
            }
            chain.push(current.to_string());

            let def = self
                .workflows
                .get(current)
                .ok_or_else(|| WorkflowError::NotFound(current.to_string()))?;
            match &def.extends {
                Some(parent) => current = parent,
                None => break,
            }
        }

        for ancestor in chain.iter().rev() {
            steps.extend(self.workflows[ancestor.as_str()].steps.iter().cloned());
        }

        let def = &self.workflows[id];
        debug!(id, steps = steps.len(), "Resolved workflow");
        Ok(ResolvedWorkflow {
            id: id.to_string(),
            name: def.name.clone(),
            description: def.description.clone(),
            steps,
        })
    }

    /// Map a task type onto a workflow id, falling back to `default`
    pub fn workflow_for_task_type(&self, task_type: &str) -> Option<&str> {
        self.task_type_mapping
            .get(task_type)
            .or_else(|| self.task_type_mapping.get("default"))
            .map(|s| s.as_str())
    }

    /// Format a named prompt template
    ///
    /// `{key}` placeholders are replaced literally and globally;
    /// placeholders without a supplied value are left as-is.
    pub fn format_prompt(&self, name: &str, data: &HashMap<String, String>) -> Result<String, WorkflowError> {
        let template = self
            .prompts
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownPrompt(name.to_string()))?;

        let mut result = template.clone();
        for (key, value) in data {
            result = result.replace(&format!("{{{}}}", key), value);
        }
        Ok(result)
    }

    pub fn prompt_names(&self) -> Vec<&str> {
        self.prompts.keys().map(|s| s.as_str()).collect()
    }

    pub fn workflow_ids(&self) -> Vec<&str> {
        self.workflows.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "workflows": {
            "parent": {
                "name": "Parent",
                "description": "base",
                "steps": [
                    { "name": "create_branch", "type": "git" },
                    { "name": "open_chat", "type": "ide" }
                ]
            },
            "child": {
                "name": "Child",
                "extends": "parent",
                "steps": [
                    { "name": "send_prompt", "type": "ide", "options": { "prompt": "go" } }
                ]
            },
            "loop-a": { "name": "A", "extends": "loop-b", "steps": [] },
            "loop-b": { "name": "B", "extends": "loop-a", "steps": [] }
        },
        "taskTypeMapping": {
            "feature": "child",
            "default": "parent"
        },
        "prompts": {
            "task-briefing": "Work on {title} in {projectPath}",
            "plain": "No placeholders here"
        }
    }"#;

    fn loader() -> WorkflowLoader {
        WorkflowLoader::from_json(FIXTURE).unwrap()
    }

    #[test]
    fn test_inheritance_parent_steps_first() {
        let resolved = loader().get_workflow("child").unwrap();
        let names: Vec<&str> = resolved.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["create_branch", "open_chat", "send_prompt"]);
        // Child step keeps its options
        assert_eq!(resolved.steps[2].options.as_ref().unwrap()["prompt"], "go");
    }

    #[test]
    fn test_resolution_idempotent() {
        let loader = loader();
        let once = loader.get_workflow("child").unwrap();
        let twice = loader.get_workflow("child").unwrap();
        assert_eq!(once.steps, twice.steps);

        // A flat workflow resolves to its own steps
        let parent = loader.get_workflow("parent").unwrap();
        assert_eq!(parent.steps.len(), 2);
    }

    #[test]
    fn test_extends_cycle_detected() {
        let err = loader().get_workflow("loop-a").unwrap_err();
        assert!(matches!(err, WorkflowError::InheritanceCycle { .. }));
    }

    #[test]
    fn test_unknown_workflow() {
        let err = loader().get_workflow("missing").unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[test]
    fn test_task_type_mapping_with_default() {
        let loader = loader();
        assert_eq!(loader.workflow_for_task_type("feature"), Some("child"));
        assert_eq!(loader.workflow_for_task_type("unknown-kind"), Some("parent"));
    }

    #[test]
    fn test_format_prompt_substitutes() {
        let mut data = HashMap::new();
        data.insert("title".to_string(), "Fix login".to_string());
        data.insert("projectPath".to_string(), "/work/app".to_string());

        let text = loader().format_prompt("task-briefing", &data).unwrap();
        assert_eq!(text, "Work on Fix login in /work/app");
    }

    #[test]
    fn test_format_prompt_missing_keys_left_as_is() {
        let data = HashMap::new();
        let text = loader().format_prompt("task-briefing", &data).unwrap();
        assert_eq!(text, "Work on {title} in {projectPath}");
    }

    #[test]
    fn test_format_prompt_no_placeholders_unchanged() {
        let mut data = HashMap::new();
        data.insert("unused".to_string(), "x".to_string());
        let text = loader().format_prompt("plain", &data).unwrap();
        assert_eq!(text, "No placeholders here");
    }

    #[test]
    fn test_unknown_prompt_is_error() {
        let err = loader().format_prompt("nope", &HashMap::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownPrompt(_)));
    }

    #[test]
    fn test_step_entry_key_defaults_to_type() {
        let entry = StepEntry {
            name: "create_branch".to_string(),
            step_type: "git".to_string(),
            category: None,
            options: None,
            strict: None,
        };
        assert_eq!(entry.key(), "git.create_branch");

        let namespaced = StepEntry {
            category: Some("refactor".to_string()),
            ..entry
        };
        assert_eq!(namespaced.key(), "refactor.create_branch");
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let loader = WorkflowLoader::embedded_defaults().unwrap();
        assert_eq!(loader.workflow_for_task_type("anything-else"), Some("task-execution"));

        let creation = loader.get_workflow("task-creation").unwrap();
        assert_eq!(creation.steps[0].key(), "task.create");

        let execution = loader.get_workflow("task-execution").unwrap();
        // Inherits the base prologue before its own steps
        assert_eq!(execution.steps[0].key(), "git.create_branch");
        assert!(execution.steps.iter().any(|s| s.key() == "task.finalize"));
    }

    #[test]
    fn test_load_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("workflows.json");
        fs::write(&path, FIXTURE).unwrap();

        let loader = WorkflowLoader::load(&path).unwrap();
        assert!(loader.workflow_ids().contains(&"parent"));

        let err = WorkflowLoader::load(&temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, WorkflowError::Io { .. }));
    }
}
