//! Per-file and per-module fact types produced by the analyzer family.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Language tag inferred from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Python source
    Python,
    /// Rust source
    Rust,
    /// JavaScript source
    JavaScript,
    /// TypeScript source
    TypeScript,
    /// Go source
    Go,
    /// Java source
    Java,
    /// Any other file (config, docs, data)
    Unknown,
}

impl Language {
    /// Infer the language tag from a path extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            "js" | "mjs" | "jsx" => Self::JavaScript,
            "ts" | "tsx" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            _ => Self::Unknown,
        }
    }

    /// True for languages the measurement provider can score.
    pub fn is_source(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Stable lowercase name used in identities and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architectural layer assignment for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// User-facing surface (UI, CLI, API handlers)
    Presentation,
    /// Domain and application logic
    Business,
    /// Persistence and data access
    Data,
    /// Cross-cutting plumbing with no upward knowledge
    Infrastructure,
}

impl Layer {
    /// All layers in canonical order.
    pub const ALL: [Layer; 4] = [
        Layer::Presentation,
        Layer::Business,
        Layer::Data,
        Layer::Infrastructure,
    ];

    /// Stable lowercase name used in identities and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::Business => "business",
            Self::Data => "data",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured facts for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFacts {
    /// Language tag
    pub language: Language,
    /// Cyclomatic complexity, clamped to [0, 1000]
    pub cyclomatic_complexity: f64,
    /// Maintainability index in [0, 100]
    pub maintainability_index: f64,
    /// Number of function-like definitions
    pub function_count: usize,
    /// Lines of code (physical lines)
    pub loc: usize,
    /// TODO/FIXME marker count
    pub todo_count: usize,
    /// Number of commits touching this file
    pub churn: usize,
    /// Test coverage ratio in [0, 1], when supplied
    pub coverage: Option<f64>,
}

impl FileFacts {
    /// Maximum representable cyclomatic complexity.
    pub const MAX_COMPLEXITY: f64 = 1000.0;

    /// Create facts for a file with everything unmeasured.
    pub fn unmeasured(language: Language) -> Self {
        Self {
            language,
            cyclomatic_complexity: 0.0,
            maintainability_index: 100.0,
            function_count: 0,
            loc: 0,
            todo_count: 0,
            churn: 0,
            coverage: None,
        }
    }

    /// Clamp all measured values into their declared bounds. Returns the
    /// fields that were out of bounds, for diagnostics.
    pub fn clamp_into_bounds(&mut self) -> Vec<&'static str> {
        let mut clamped = Vec::new();
        if !(0.0..=Self::MAX_COMPLEXITY).contains(&self.cyclomatic_complexity)
            || self.cyclomatic_complexity.is_nan()
        {
            self.cyclomatic_complexity = self.cyclomatic_complexity.clamp(0.0, Self::MAX_COMPLEXITY);
            if self.cyclomatic_complexity.is_nan() {
                self.cyclomatic_complexity = 0.0;
            }
            clamped.push("cyclomatic_complexity");
        }
        if !(0.0..=100.0).contains(&self.maintainability_index) || self.maintainability_index.is_nan()
        {
            self.maintainability_index = self.maintainability_index.clamp(0.0, 100.0);
            if self.maintainability_index.is_nan() {
                self.maintainability_index = 100.0;
            }
            clamped.push("maintainability_index");
        }
        if let Some(cov) = self.coverage {
            if !(0.0..=1.0).contains(&cov) || cov.is_nan() {
                self.coverage = Some(if cov.is_nan() { 0.0 } else { cov.clamp(0.0, 1.0) });
                clamped.push("coverage");
            }
        }
        clamped
    }
}

/// Aggregated facts for a module (filesystem-prefix partition of files).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFacts {
    /// Member file paths
    pub members: BTreeSet<PathBuf>,
    /// Mean cyclomatic complexity over members
    pub mean_complexity: f64,
    /// Total lines of code over members
    pub total_loc: usize,
    /// Total churn over members
    pub total_churn: usize,
    /// Total TODO markers over members
    pub total_todos: usize,
    /// Architectural layer assignment
    pub layer: Layer,
}

impl ModuleFacts {
    /// Create an empty module assigned to the given layer.
    pub fn empty(layer: Layer) -> Self {
        Self {
            members: BTreeSet::new(),
            mean_complexity: 0.0,
            total_loc: 0,
            total_churn: 0,
            total_todos: 0,
            layer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_inference_from_extension() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("toml"), Language::Unknown);
    }

    #[test]
    fn clamping_reports_out_of_bounds_fields() {
        let mut facts = FileFacts::unmeasured(Language::Rust);
        facts.cyclomatic_complexity = 2000.0;
        facts.coverage = Some(1.5);

        let clamped = facts.clamp_into_bounds();
        assert_eq!(clamped, vec!["cyclomatic_complexity", "coverage"]);
        assert_eq!(facts.cyclomatic_complexity, FileFacts::MAX_COMPLEXITY);
        assert_eq!(facts.coverage, Some(1.0));
    }

    #[test]
    fn clamping_is_a_no_op_inside_bounds() {
        let mut facts = FileFacts::unmeasured(Language::Python);
        facts.cyclomatic_complexity = 12.0;
        assert!(facts.clamp_into_bounds().is_empty());
    }
}
