//! Complexity analyzer: per-file complexity, maintainability, and function
//! counts via the pluggable measurement provider.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::core::errors::{RepoqError, Result};
use crate::core::model::{FileFacts, Issue, IssueKind, Severity};
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};
use crate::providers::MeasurementProvider;

use super::{Analyzer, AnalyzerOutput, AnalyzerRun};

/// Measured values for one file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileMeasure {
    /// Cyclomatic complexity, clamped to [0, 1000]
    pub complexity: f64,
    /// Maintainability index in [0, 100]
    pub maintainability: f64,
    /// Function-like definitions
    pub function_count: usize,
}

/// Output of the complexity analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFacts {
    /// Per-file measurements, source files only
    pub per_file: BTreeMap<PathBuf, FileMeasure>,
}

impl ComplexityFacts {
    /// Mean cyclomatic complexity over measured files; 0 when nothing was
    /// measured.
    pub fn mean_complexity(&self) -> f64 {
        if self.per_file.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.per_file.values().map(|m| m.complexity).sum();
        sum / self.per_file.len() as f64
    }
}

/// Per-file measurement via the configured provider.
pub struct ComplexityAnalyzer {
    info: AnalyzerInfo,
    measurement: Arc<dyn MeasurementProvider>,
}

impl ComplexityAnalyzer {
    /// Create the analyzer over a measurement provider.
    pub fn new(measurement: Arc<dyn MeasurementProvider>) -> Self {
        Self {
            info: AnalyzerInfo::new(AnalyzerKind::Complexity, &[AnalyzerKind::Structure], 1),
            measurement,
        }
    }
}

#[async_trait]
impl Analyzer for ComplexityAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        let structure = view.structure(AnalyzerKind::Complexity)?;

        // Source files only, in path order for deterministic aggregation
        let targets: Vec<PathBuf> = structure
            .languages
            .iter()
            .filter(|(_, language)| language.is_source())
            .map(|(path, _)| path.clone())
            .collect();

        let measured: Vec<Result<(PathBuf, std::result::Result<FileMeasure, String>)>> = targets
            .par_iter()
            .map(|path| {
                if view.is_cancelled() {
                    return Err(RepoqError::Cancelled {
                        stage: AnalyzerKind::Complexity.to_string(),
                    });
                }
                let language = structure.languages[path];
                let outcome = match view.snapshot.read_file(path) {
                    Ok(content) => match self.measurement.measure(&content, language) {
                        Ok(m) => Ok(FileMeasure {
                            complexity: m.complexity,
                            maintainability: m.maintainability,
                            function_count: m.function_count,
                        }),
                        Err(e) => Err(format!("measurement failed: {e}")),
                    },
                    Err(e) => Err(format!("unreadable: {e}")),
                };
                Ok((path.clone(), outcome))
            })
            .collect();

        let mut facts = ComplexityFacts::default();
        let mut issues = Vec::new();
        let mut diagnostics = Vec::new();

        for item in measured {
            let (path, outcome) = item?;
            match outcome {
                Ok(mut measure) => {
                    if measure.complexity > FileFacts::MAX_COMPLEXITY {
                        diagnostics.push(format!(
                            "complexity clamped for {} ({} -> {})",
                            path.display(),
                            measure.complexity,
                            FileFacts::MAX_COMPLEXITY
                        ));
                        measure.complexity = FileFacts::MAX_COMPLEXITY;
                    }
                    facts.per_file.insert(path, measure);
                }
                Err(reason) => {
                    // Unparseable files carry zero complexity plus a finding
                    facts.per_file.insert(
                        path.clone(),
                        FileMeasure {
                            complexity: 0.0,
                            maintainability: 0.0,
                            function_count: 0,
                        },
                    );
                    issues.push(
                        Issue::new(
                            IssueKind::Other,
                            Severity::Minor,
                            path,
                            None,
                            format!("file could not be measured: {reason}"),
                        )
                        .with_suggestion("fix the syntax error so metrics can be computed"),
                    );
                }
            }
        }

        debug!(measured = facts.per_file.len(), "complexity analysis complete");

        Ok(AnalyzerRun {
            output: AnalyzerOutput::Complexity(facts),
            issues,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::context::test_support::view_with_outputs;
    use crate::core::snapshot::Snapshot;
    use crate::detectors::StructureAnalyzer;
    use crate::providers::LexicalMeasurementProvider;
    use std::collections::BTreeMap;
    use std::path::Path;

    async fn run_over(snapshot: Snapshot) -> AnalyzerRun {
        let structure_run = StructureAnalyzer::new()
            .run(crate::core::pipeline::context::test_support::view_for(
                snapshot.clone(),
            ))
            .await
            .unwrap();
        let mut outputs = BTreeMap::new();
        outputs.insert(AnalyzerKind::Structure, structure_run.output);

        ComplexityAnalyzer::new(Arc::new(LexicalMeasurementProvider::new()))
            .run(view_with_outputs(snapshot, outputs))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn measures_source_files_only() {
        let snapshot = Snapshot::builder()
            .file("a.py", "if x:\n    pass\n")
            .file("README.md", "# doc\n")
            .build("p");

        let run = run_over(snapshot).await;
        let AnalyzerOutput::Complexity(facts) = run.output else {
            panic!("wrong variant");
        };
        assert!(facts.per_file.contains_key(Path::new("a.py")));
        assert!(!facts.per_file.contains_key(Path::new("README.md")));
        assert_eq!(facts.per_file[Path::new("a.py")].complexity, 2.0);
    }

    #[tokio::test]
    async fn unparseable_file_scores_zero_with_issue() {
        let snapshot = Snapshot::builder()
            .file("bad.rs", "fn broken() {{{{{{\n")
            .build("p");

        let run = run_over(snapshot).await;
        let AnalyzerOutput::Complexity(facts) = run.output else {
            panic!("wrong variant");
        };
        assert_eq!(facts.per_file[Path::new("bad.rs")].complexity, 0.0);
        assert_eq!(run.issues.len(), 1);
        assert_eq!(run.issues[0].kind, IssueKind::Other);
    }

    #[tokio::test]
    async fn missing_structure_dependency_is_reported() {
        let snapshot = Snapshot::builder().file("a.py", "x = 1\n").build("p");
        let err = ComplexityAnalyzer::new(Arc::new(LexicalMeasurementProvider::new()))
            .run(view_with_outputs(snapshot, BTreeMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoqError::DependencyUnavailable { .. }));
    }
}
