//! The fixed analyzer family.
//!
//! Eight analyzers, each with declared dependencies, a universe tier, and a
//! typed output variant. They are enumerated in one registration point
//! ([`register_default_analyzers`]) rather than discovered by side effects,
//! so the scheduler's dependency resolution is statically checkable.

pub mod architecture;
pub mod ci;
pub mod complexity;
pub mod docsync;
pub mod history;
pub mod hotspots;
pub mod structure;
pub mod weakness;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::core::model::Issue;
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerRegistry};
use crate::providers::MeasurementProvider;

pub use architecture::{ArchitectureAnalyzer, ArchitectureFacts};
pub use ci::{CiFacts, CiQmAnalyzer, TestSummary};
pub use complexity::{ComplexityAnalyzer, ComplexityFacts, FileMeasure};
pub use docsync::{DocCodeSyncAnalyzer, DocSyncFacts};
pub use history::{HistoryAnalyzer, HistoryFacts};
pub use hotspots::{HotspotFacts, HotspotsAnalyzer};
pub use structure::{StructureAnalyzer, StructureFacts};
pub use weakness::{WeaknessAnalyzer, WeaknessFacts};

/// Typed output of one analyzer execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analyzer", rename_all = "snake_case")]
pub enum AnalyzerOutput {
    /// Structure analyzer output
    Structure(StructureFacts),
    /// Complexity analyzer output
    Complexity(ComplexityFacts),
    /// History analyzer output
    History(HistoryFacts),
    /// Weakness analyzer output
    Weakness(WeaknessFacts),
    /// CI/QM analyzer output
    CiQm(CiFacts),
    /// Hotspot analyzer output
    Hotspots(HotspotFacts),
    /// Architecture analyzer output
    Architecture(ArchitectureFacts),
    /// Doc-code sync analyzer output
    DocCodeSync(DocSyncFacts),
}

/// The full result of one analyzer invocation: the typed output plus the
/// issues and diagnostics it emitted. Issues are staged by the executor and
/// frozen at the stage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerRun {
    /// Typed output
    pub output: AnalyzerOutput,
    /// Issues emitted during this invocation
    pub issues: Vec<Issue>,
    /// Non-fatal diagnostics
    pub diagnostics: Vec<String>,
}

impl AnalyzerRun {
    /// Wrap an output with no findings.
    pub fn output_only(output: AnalyzerOutput) -> Self {
        Self {
            output,
            issues: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// One analyzer in the fixed family.
///
/// Implementations must aggregate file-level results in path order so the
/// output is deterministic, and must observe the stage view's cancellation
/// token at file boundaries.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Registered metadata: kind, dependencies, tier, version.
    fn info(&self) -> &AnalyzerInfo;

    /// Execute over the stage view.
    async fn run(&self, view: StageView) -> Result<AnalyzerRun>;
}

/// The single registration point for the default analyzer family.
pub fn register_default_analyzers(
    registry: &mut AnalyzerRegistry,
    measurement: Arc<dyn MeasurementProvider>,
) {
    registry.register(Arc::new(StructureAnalyzer::new()));
    registry.register(Arc::new(ComplexityAnalyzer::new(measurement)));
    registry.register(Arc::new(HistoryAnalyzer::new()));
    registry.register(Arc::new(WeaknessAnalyzer::new()));
    registry.register(Arc::new(CiQmAnalyzer::new()));
    registry.register(Arc::new(HotspotsAnalyzer::new()));
    registry.register(Arc::new(ArchitectureAnalyzer::new()));
    registry.register(Arc::new(DocCodeSyncAnalyzer::new()));
}
