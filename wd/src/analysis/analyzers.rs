//! Per-type analyzers
//!
//! Each analyzer ingests scanned files batch by batch and produces a
//! JSON result. Recommendations is the odd one out: it derives from
//! the other types' results instead of scanning.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Value, json};

use super::job::AnalysisType;
use super::scanner::ScannedFile;

/// Incremental analyzer over streamed file batches
pub trait Analyzer: Send {
    fn ingest(&mut self, file: &ScannedFile);
    fn finish(&mut self) -> Value;
}

/// Analyzer for a scanning type; `None` for recommendations, which is
/// derived from the other results
pub fn analyzer_for(analysis_type: AnalysisType) -> Option<Box<dyn Analyzer>> {
    match analysis_type {
        AnalysisType::CodeQuality => Some(Box::new(CodeQualityAnalyzer::new())),
        AnalysisType::Security => Some(Box::new(SecurityAnalyzer::new())),
        AnalysisType::Performance => Some(Box::new(PerformanceAnalyzer::default())),
        AnalysisType::Architecture => Some(Box::new(ArchitectureAnalyzer::default())),
        AnalysisType::Techstack => Some(Box::new(TechstackAnalyzer::default())),
        AnalysisType::Recommendations => None,
    }
}

const LONG_LINE: usize = 120;
const MAX_FINDINGS: usize = 100;

struct CodeQualityAnalyzer {
    files: usize,
    total_lines: usize,
    long_lines: usize,
    todos: usize,
    todo_re: Regex,
}

impl CodeQualityAnalyzer {
    fn new() -> Self {
        Self {
            files: 0,
            total_lines: 0,
            long_lines: 0,
            todos: 0,
            todo_re: Regex::new(r"\b(TODO|FIXME|HACK|XXX)\b").unwrap(),
        }
    }
}

impl Analyzer for CodeQualityAnalyzer {
    fn ingest(&mut self, file: &ScannedFile) {
        self.files += 1;
        self.total_lines += file.lines.len();
        for line in &file.lines {
            if line.len() > LONG_LINE {
                self.long_lines += 1;
            }
            if self.todo_re.is_match(line) {
                self.todos += 1;
            }
        }
    }

    fn finish(&mut self) -> Value {
        json!({
            "filesScanned": self.files,
            "totalLines": self.total_lines,
            "longLines": self.long_lines,
            "todoCount": self.todos,
        })
    }
}

struct SecurityAnalyzer {
    files: usize,
    patterns: Vec<(&'static str, Regex)>,
    findings: Vec<Value>,
}

impl SecurityAnalyzer {
    fn new() -> Self {
        let patterns = vec![
            (
                "hardcoded-credential",
                Regex::new(r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][^"']{8,}["']"#).unwrap(),
            ),
            ("dynamic-eval", Regex::new(r"\beval\s*\(").unwrap()),
            ("insecure-url", Regex::new(r"http://[^\s'\x22]+").unwrap()),
        ];
        Self {
            files: 0,
            patterns,
            findings: Vec::new(),
        }
    }
}

impl Analyzer for SecurityAnalyzer {
    fn ingest(&mut self, file: &ScannedFile) {
        self.files += 1;
        for (number, line) in file.lines.iter().enumerate() {
            for (kind, pattern) in &self.patterns {
                if self.findings.len() >= MAX_FINDINGS {
                    return;
                }
                if pattern.is_match(line) {
                    self.findings.push(json!({
                        "kind": kind,
                        "file": file.relative,
                        "line": number + 1,
                    }));
                }
            }
        }
    }

    fn finish(&mut self) -> Value {
        json!({
            "filesScanned": self.files,
            "findingCount": self.findings.len(),
            "findings": self.findings,
        })
    }
}

#[derive(Default)]
struct PerformanceAnalyzer {
    files: usize,
    total_bytes: u64,
    large_files: Vec<Value>,
    deeply_nested_lines: usize,
}

/// Files above this size are flagged
const LARGE_FILE: u64 = 500 * 1024;
/// Indentation depth treated as a nesting smell
const DEEP_INDENT: usize = 24;

impl Analyzer for PerformanceAnalyzer {
    fn ingest(&mut self, file: &ScannedFile) {
        self.files += 1;
        self.total_bytes += file.size;
        if file.size > LARGE_FILE {
            self.large_files.push(json!({ "file": file.relative, "size": file.size }));
        }
        for line in &file.lines {
            let indent = line.len() - line.trim_start().len();
            if indent >= DEEP_INDENT {
                self.deeply_nested_lines += 1;
            }
        }
    }

    fn finish(&mut self) -> Value {
        json!({
            "filesScanned": self.files,
            "totalBytes": self.total_bytes,
            "largeFiles": self.large_files,
            "deeplyNestedLines": self.deeply_nested_lines,
        })
    }
}

#[derive(Default)]
struct ArchitectureAnalyzer {
    files: usize,
    top_level: HashMap<String, usize>,
    max_depth: usize,
}

impl Analyzer for ArchitectureAnalyzer {
    fn ingest(&mut self, file: &ScannedFile) {
        self.files += 1;
        let mut components = file.relative.split('/');
        let first = components.next().unwrap_or("");
        let depth = file.relative.matches('/').count();
        self.max_depth = self.max_depth.max(depth);
        let bucket = if file.relative.contains('/') { first } else { "<root>" };
        *self.top_level.entry(bucket.to_string()).or_insert(0) += 1;
    }

    fn finish(&mut self) -> Value {
        json!({
            "filesScanned": self.files,
            "topLevelDirs": self.top_level,
            "maxDepth": self.max_depth,
        })
    }
}

#[derive(Default)]
struct TechstackAnalyzer {
    extensions: HashMap<String, usize>,
    manifests: Vec<String>,
}

/// Manifest file -> detected stack
const MANIFESTS: &[(&str, &str)] = &[
    ("package.json", "node"),
    ("Cargo.toml", "rust"),
    ("pyproject.toml", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("Gemfile", "ruby"),
];

impl Analyzer for TechstackAnalyzer {
    fn ingest(&mut self, file: &ScannedFile) {
        if !file.extension.is_empty() {
            *self.extensions.entry(file.extension.clone()).or_insert(0) += 1;
        }
        if let Some((_, stack)) = MANIFESTS.iter().find(|(name, _)| file.relative == *name) {
            self.manifests.push(stack.to_string());
        }
    }

    fn finish(&mut self) -> Value {
        self.manifests.sort();
        self.manifests.dedup();
        json!({
            "extensions": self.extensions,
            "stacks": self.manifests,
        })
    }
}

/// Derive recommendations from the other types' results
pub fn recommendations_from(results: &HashMap<AnalysisType, Value>) -> Value {
    let mut recommendations = Vec::new();

    if let Some(quality) = results.get(&AnalysisType::CodeQuality) {
        if quality["todoCount"].as_u64().unwrap_or(0) > 20 {
            recommendations.push(json!({
                "type": "code-quality",
                "message": "High TODO/FIXME density; schedule a cleanup pass",
            }));
        }
        if quality["longLines"].as_u64().unwrap_or(0) > 100 {
            recommendations.push(json!({
                "type": "code-quality",
                "message": "Many lines exceed 120 columns; consider a formatter",
            }));
        }
    }

    if let Some(security) = results.get(&AnalysisType::Security) {
        if security["findingCount"].as_u64().unwrap_or(0) > 0 {
            recommendations.push(json!({
                "type": "security",
                "message": "Potential secrets or insecure patterns found; review the security findings",
            }));
        }
    }

    if let Some(performance) = results.get(&AnalysisType::Performance) {
        if performance["largeFiles"].as_array().map(|a| !a.is_empty()).unwrap_or(false) {
            recommendations.push(json!({
                "type": "performance",
                "message": "Large source files detected; consider splitting them",
            }));
        }
    }

    json!({ "recommendations": recommendations, "derivedFrom": results.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(relative: &str, lines: &[&str]) -> ScannedFile {
        ScannedFile {
            path: PathBuf::from(relative),
            relative: relative.to_string(),
            extension: PathBuf::from(relative)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string(),
            size: lines.iter().map(|l| l.len() as u64 + 1).sum(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_code_quality_counts() {
        let mut analyzer = analyzer_for(AnalysisType::CodeQuality).unwrap();
        analyzer.ingest(&file(
            "src/main.rs",
            &["fn main() {}", "// TODO: fix this", &"x".repeat(150)],
        ));

        let result = analyzer.finish();
        assert_eq!(result["filesScanned"], 1);
        assert_eq!(result["totalLines"], 3);
        assert_eq!(result["todoCount"], 1);
        assert_eq!(result["longLines"], 1);
    }

    #[test]
    fn test_security_findings() {
        let mut analyzer = analyzer_for(AnalysisType::Security).unwrap();
        analyzer.ingest(&file(
            "config.js",
            &[
                "const api_key = \"sk-abcdef1234567890\"",
                "eval(userInput)",
                "fetch('http://insecure.example.com')",
                "const safe = 1",
            ],
        ));

        let result = analyzer.finish();
        assert_eq!(result["findingCount"], 3);
        let kinds: Vec<&str> = result["findings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["kind"].as_str().unwrap())
            .collect();
        assert!(kinds.contains(&"hardcoded-credential"));
        assert!(kinds.contains(&"dynamic-eval"));
        assert!(kinds.contains(&"insecure-url"));
    }

    #[test]
    fn test_techstack_detects_manifests() {
        let mut analyzer = analyzer_for(AnalysisType::Techstack).unwrap();
        analyzer.ingest(&file("Cargo.toml", &["[package]"]));
        analyzer.ingest(&file("src/main.rs", &["fn main() {}"]));

        let result = analyzer.finish();
        assert_eq!(result["stacks"], json!(["rust"]));
        assert_eq!(result["extensions"]["rs"], 1);
    }

    #[test]
    fn test_architecture_buckets() {
        let mut analyzer = analyzer_for(AnalysisType::Architecture).unwrap();
        analyzer.ingest(&file("src/a.rs", &[""]));
        analyzer.ingest(&file("src/deep/b.rs", &[""]));
        analyzer.ingest(&file("README.md", &[""]));

        let result = analyzer.finish();
        assert_eq!(result["topLevelDirs"]["src"], 2);
        assert_eq!(result["topLevelDirs"]["<root>"], 1);
        assert_eq!(result["maxDepth"], 2);
    }

    #[test]
    fn test_recommendations_from_results() {
        let mut results = HashMap::new();
        results.insert(AnalysisType::Security, json!({ "findingCount": 3 }));
        results.insert(AnalysisType::CodeQuality, json!({ "todoCount": 50, "longLines": 2 }));

        let value = recommendations_from(&results);
        let recs = value["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 2);
    }

    #[test]
    fn test_recommendations_empty_without_signals() {
        let value = recommendations_from(&HashMap::new());
        assert!(value["recommendations"].as_array().unwrap().is_empty());
    }
}
