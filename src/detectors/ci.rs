//! CI/QM analyzer: CI-configuration presence and JUnit report ingestion.

use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::Result;
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};

use super::{Analyzer, AnalyzerOutput, AnalyzerRun};

/// Well-known CI configuration locations.
static CI_MARKERS: &[&str] = &[
    ".gitlab-ci.yml",
    "Jenkinsfile",
    ".travis.yml",
    "azure-pipelines.yml",
];

/// Aggregated outcome of a JUnit-style report set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Total test cases
    pub total: usize,
    /// Failed cases
    pub failed: usize,
    /// Errored cases
    pub errors: usize,
    /// Skipped cases
    pub skipped: usize,
}

impl TestSummary {
    /// Passing cases.
    pub fn passed(&self) -> usize {
        self.total
            .saturating_sub(self.failed)
            .saturating_sub(self.errors)
            .saturating_sub(self.skipped)
    }

    /// Pass ratio in [0, 1]; 0 for an empty report.
    pub fn pass_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed() as f64 / self.total as f64
    }
}

/// Output of the CI/QM analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CiFacts {
    /// Whether any CI configuration is present
    pub ci_present: bool,
    /// Parsed test outcomes, when a JUnit-style report exists
    pub test_summary: Option<TestSummary>,
}

/// CI presence and quality-metric ingestion.
pub struct CiQmAnalyzer {
    info: AnalyzerInfo,
}

impl CiQmAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(AnalyzerKind::CiQm, &[AnalyzerKind::Structure], 0),
        }
    }
}

impl Default for CiQmAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for CiQmAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        // Dependency declared for scheduling symmetry with the other
        // structure-derived analyzers; the file list itself suffices here.
        let _ = view.structure(AnalyzerKind::CiQm)?;

        let mut facts = CiFacts::default();
        let mut diagnostics = Vec::new();

        facts.ci_present = view.snapshot.files.iter().any(|entry| is_ci_path(&entry.path));

        let mut summary = TestSummary::default();
        let mut saw_report = false;
        for entry in &view.snapshot.files {
            if !is_junit_report(&entry.path) {
                continue;
            }
            match view.snapshot.read_file(&entry.path) {
                Ok(content) => match parse_junit(&content) {
                    Ok(parsed) => {
                        saw_report = true;
                        summary.total += parsed.total;
                        summary.failed += parsed.failed;
                        summary.errors += parsed.errors;
                        summary.skipped += parsed.skipped;
                    }
                    Err(e) => diagnostics.push(format!(
                        "ci_qm: malformed test report {}: {e}",
                        entry.path.display()
                    )),
                },
                Err(e) => diagnostics.push(format!(
                    "ci_qm: unreadable test report {}: {e}",
                    entry.path.display()
                )),
            }
        }
        if saw_report {
            facts.test_summary = Some(summary);
        }

        debug!(
            ci_present = facts.ci_present,
            has_reports = facts.test_summary.is_some(),
            "ci/qm analysis complete"
        );

        Ok(AnalyzerRun {
            output: AnalyzerOutput::CiQm(facts),
            issues: Vec::new(),
            diagnostics,
        })
    }
}

/// Whether a path is a CI configuration file.
fn is_ci_path(path: &Path) -> bool {
    let text = path.to_string_lossy();
    if text.starts_with(".github/workflows/") && (text.ends_with(".yml") || text.ends_with(".yaml"))
    {
        return true;
    }
    if text.starts_with(".circleci/") {
        return true;
    }
    CI_MARKERS.iter().any(|marker| text.as_ref() == *marker)
}

/// Whether a path looks like a JUnit-style report.
fn is_junit_report(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if !name.ends_with(".xml") {
        return false;
    }
    name.starts_with("TEST-")
        || name.contains("junit")
        || path
            .parent()
            .is_some_and(|p| p.to_string_lossy().contains("test-results"))
}

/// Count testcase/failure/error/skipped elements in a JUnit document.
fn parse_junit(content: &str) -> std::result::Result<TestSummary, String> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut summary = TestSummary::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                match tag.name().as_ref() {
                    b"testcase" => summary.total += 1,
                    b"failure" => summary.failed += 1,
                    b"error" => summary.errors += 1,
                    b"skipped" => summary.skipped += 1,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }
    Ok(summary)
}
