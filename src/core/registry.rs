//! Analyzer registry and topological scheduler.
//!
//! Analyzers are enumerated in a single registration point at startup;
//! dependencies are part of the analyzer's metadata. The scheduler turns the
//! enabled subset into an ordered sequence of stages via Kahn's algorithm;
//! analyzers within one stage have no edges between them and may run in
//! parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{RepoqError, Result};
use crate::detectors::Analyzer;

/// Identity of an analyzer in the fixed family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// File enumeration, module partitioning, manifest parsing
    Structure,
    /// Complexity, maintainability, function counts
    Complexity,
    /// Commit history, churn, contributors
    History,
    /// TODO markers, secrets, hygiene, license and advisory checks
    Weakness,
    /// CI presence and test report ingestion
    CiQm,
    /// Top-k hot files by complexity × churn
    Hotspots,
    /// Layer assignment, layering violations, dependency cycles
    Architecture,
    /// Docstring-versus-signature consistency
    DocCodeSync,
}

impl AnalyzerKind {
    /// The whole fixed family in canonical order.
    pub const ALL: [AnalyzerKind; 8] = [
        AnalyzerKind::Structure,
        AnalyzerKind::Complexity,
        AnalyzerKind::History,
        AnalyzerKind::Weakness,
        AnalyzerKind::CiQm,
        AnalyzerKind::Hotspots,
        AnalyzerKind::Architecture,
        AnalyzerKind::DocCodeSync,
    ];

    /// Stable snake_case name used in policies, caches and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Complexity => "complexity",
            Self::History => "history",
            Self::Weakness => "weakness",
            Self::CiQm => "ci_qm",
            Self::Hotspots => "hotspots",
            Self::Architecture => "architecture",
            Self::DocCodeSync => "doc_code_sync",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered metadata for one analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerInfo {
    /// Analyzer identity
    pub kind: AnalyzerKind,
    /// Analyzers whose output this one consumes
    pub dependencies: Vec<AnalyzerKind>,
    /// Universe tier: 0 = parse-only, 1 = metrics, 2 = ontological mapping
    pub tier: u8,
    /// Whether the analyzer runs when the policy does not name it
    pub enabled_by_default: bool,
    /// Version tag carried into cache keys
    pub version: u32,
}

impl AnalyzerInfo {
    /// Create metadata for an analyzer.
    pub fn new(kind: AnalyzerKind, dependencies: &[AnalyzerKind], tier: u8) -> Self {
        Self {
            kind,
            dependencies: dependencies.to_vec(),
            tier,
            enabled_by_default: true,
            version: 1,
        }
    }

    /// Override the analyzer version tag.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// Metadata-keyed catalog of analyzers.
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<AnalyzerKind, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer instance. Re-registration of the same kind
    /// replaces the previous instance.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(analyzer.info().kind, analyzer);
    }

    /// Look up an analyzer by kind.
    pub fn get(&self, kind: AnalyzerKind) -> Option<&Arc<dyn Analyzer>> {
        self.analyzers.get(&kind)
    }

    /// Registered metadata, in canonical kind order.
    pub fn infos(&self) -> impl Iterator<Item = &AnalyzerInfo> {
        self.analyzers.values().map(|a| a.info())
    }

    /// Number of registered analyzers.
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    /// True when no analyzer is registered.
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Compute the execution plan for the enabled subset.
    pub fn plan(&self, enabled: &BTreeSet<AnalyzerKind>) -> Result<ExecutionPlan> {
        let selected: BTreeMap<AnalyzerKind, &AnalyzerInfo> = self
            .analyzers
            .iter()
            .filter(|(kind, _)| enabled.contains(kind))
            .map(|(kind, analyzer)| (*kind, analyzer.info()))
            .collect();

        ExecutionPlan::compute(&selected)
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.analyzers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Ordered sequence of stages; each stage is a set of analyzers whose
/// dependencies were all satisfied by prior stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Stages in execution order; analyzers within a stage are sorted by
    /// kind for reproducibility.
    pub stages: Vec<Vec<AnalyzerKind>>,
}

impl ExecutionPlan {
    /// Kahn's algorithm over the enabled analyzer metadata. Edges to
    /// disabled analyzers are ignored here; the executor resolves the
    /// resulting missing outputs as `DependencyUnavailable` at run time.
    fn compute(selected: &BTreeMap<AnalyzerKind, &AnalyzerInfo>) -> Result<Self> {
        // In-degree counts edges from enabled dependencies only.
        let mut in_degree: BTreeMap<AnalyzerKind, usize> = BTreeMap::new();
        for (kind, info) in selected {
            let degree = info
                .dependencies
                .iter()
                .filter(|dep| selected.contains_key(*dep))
                .count();
            in_degree.insert(*kind, degree);
        }

        let mut stages = Vec::new();
        let mut remaining: BTreeSet<AnalyzerKind> = selected.keys().copied().collect();

        while !remaining.is_empty() {
            let stage: Vec<AnalyzerKind> = remaining
                .iter()
                .filter(|kind| in_degree[*kind] == 0)
                .copied()
                .collect();

            if stage.is_empty() {
                // Everything left participates in (or depends on) a cycle.
                let cycle: Vec<String> = remaining.iter().map(|k| k.to_string()).collect();
                return Err(RepoqError::DependencyCycle { cycle });
            }

            for kind in &stage {
                remaining.remove(kind);
            }
            for kind in &remaining {
                let satisfied = selected[kind]
                    .dependencies
                    .iter()
                    .filter(|dep| stage.contains(*dep))
                    .count();
                if let Some(degree) = in_degree.get_mut(kind) {
                    *degree = degree.saturating_sub(satisfied);
                }
            }
            stages.push(stage);
        }

        debug!(stage_count = stages.len(), "computed execution plan");
        Ok(Self { stages })
    }

    /// Flat iteration over all scheduled analyzers in execution order.
    pub fn scheduled(&self) -> impl Iterator<Item = AnalyzerKind> + '_ {
        self.stages.iter().flatten().copied()
    }

    /// Total number of scheduled analyzers.
    pub fn analyzer_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_for(infos: Vec<AnalyzerInfo>) -> Result<ExecutionPlan> {
        let selected: BTreeMap<AnalyzerKind, AnalyzerInfo> =
            infos.into_iter().map(|i| (i.kind, i)).collect();
        let refs: BTreeMap<AnalyzerKind, &AnalyzerInfo> =
            selected.iter().map(|(k, v)| (*k, v)).collect();
        ExecutionPlan::compute(&refs)
    }

    #[test]
    fn independent_analyzers_share_the_first_stage() {
        let plan = plan_for(vec![
            AnalyzerInfo::new(AnalyzerKind::Structure, &[], 0),
            AnalyzerInfo::new(AnalyzerKind::History, &[], 0),
        ])
        .unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(
            plan.stages[0],
            vec![AnalyzerKind::Structure, AnalyzerKind::History]
        );
    }

    #[test]
    fn dependencies_order_the_stages() {
        let plan = plan_for(vec![
            AnalyzerInfo::new(AnalyzerKind::Structure, &[], 0),
            AnalyzerInfo::new(AnalyzerKind::Complexity, &[AnalyzerKind::Structure], 1),
            AnalyzerInfo::new(AnalyzerKind::History, &[], 0),
            AnalyzerInfo::new(
                AnalyzerKind::Hotspots,
                &[AnalyzerKind::Complexity, AnalyzerKind::History],
                1,
            ),
        ])
        .unwrap();

        assert_eq!(plan.stages.len(), 3);
        assert!(plan.stages[0].contains(&AnalyzerKind::Structure));
        assert!(plan.stages[0].contains(&AnalyzerKind::History));
        assert_eq!(plan.stages[1], vec![AnalyzerKind::Complexity]);
        assert_eq!(plan.stages[2], vec![AnalyzerKind::Hotspots]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let result = plan_for(vec![
            AnalyzerInfo::new(AnalyzerKind::Structure, &[AnalyzerKind::Complexity], 0),
            AnalyzerInfo::new(AnalyzerKind::Complexity, &[AnalyzerKind::Structure], 1),
        ]);

        match result {
            Err(RepoqError::DependencyCycle { cycle }) => {
                assert!(cycle.contains(&"structure".to_string()));
                assert!(cycle.contains(&"complexity".to_string()));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn disabled_dependency_edges_are_ignored_in_planning() {
        // Hotspots depends on Complexity + History, but only History is enabled.
        let plan = plan_for(vec![
            AnalyzerInfo::new(AnalyzerKind::History, &[], 0),
            AnalyzerInfo::new(
                AnalyzerKind::Hotspots,
                &[AnalyzerKind::Complexity, AnalyzerKind::History],
                1,
            ),
        ])
        .unwrap();

        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.stages[1], vec![AnalyzerKind::Hotspots]);
    }
}
