//! Carried analysis context and the per-stage analyzer input view.
//!
//! The normalizer, stratification guard, and cache are context values handed
//! through the pipeline explicitly; nothing here is process-global.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::config::Policy;
use crate::core::errors::{RepoqError, Result};
use crate::core::model::Issue;
use crate::core::normalize::Normalizer;
use crate::core::registry::AnalyzerKind;
use crate::core::snapshot::Snapshot;
use crate::core::strata::StratificationGuard;
use crate::detectors::{AnalyzerOutput, ComplexityFacts, HistoryFacts, StructureFacts};
use crate::io::cache::AnalysisCache;
use crate::providers::MeasurementProvider;

/// Run-wide context: everything an analysis needs beyond the snapshot.
pub struct AnalysisContext {
    /// The policy in force
    pub policy: Arc<Policy>,
    /// The pure normalizer
    pub normalizer: Arc<Normalizer>,
    /// Stratification guard
    pub guard: Arc<StratificationGuard>,
    /// Analysis cache (in-memory when persistence is disabled)
    pub cache: Arc<AnalysisCache>,
    /// Metric extractor
    pub measurement: Arc<dyn MeasurementProvider>,
    /// Cooperative cancellation signal
    pub cancel: CancellationToken,
}

impl AnalysisContext {
    /// Build a context from a policy and measurement provider, with a fresh
    /// guard, normalizer, and cache derived from the policy.
    pub fn new(policy: Policy, measurement: Arc<dyn MeasurementProvider>) -> Self {
        let cache = match &policy.cache_dir {
            Some(dir) => AnalysisCache::persistent(dir.clone()),
            None => AnalysisCache::in_memory(),
        };
        Self {
            guard: Arc::new(StratificationGuard::new(policy.stratification.clone())),
            normalizer: Arc::new(Normalizer::new()),
            cache: Arc::new(cache),
            policy: Arc::new(policy),
            measurement,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the stratification guard (e.g. to declare a self identity).
    pub fn with_guard(mut self, guard: StratificationGuard) -> Self {
        self.guard = Arc::new(guard);
        self
    }
}

/// The input view one analyzer receives: the snapshot, the policy, the
/// outputs of its dependencies, and the issues frozen by earlier stages.
#[derive(Clone)]
pub struct StageView {
    /// The snapshot under analysis
    pub snapshot: Arc<Snapshot>,
    /// The policy in force
    pub policy: Arc<Policy>,
    /// The pure normalizer
    pub normalizer: Arc<Normalizer>,
    /// Metric extractor
    pub measurement: Arc<dyn MeasurementProvider>,
    /// Outputs of analyzers completed in prior stages
    pub outputs: Arc<BTreeMap<AnalyzerKind, AnalyzerOutput>>,
    /// Issues frozen at earlier stage boundaries (read-only)
    pub frozen_issues: Arc<Vec<Issue>>,
    /// Cancellation signal; analyzers return promptly at the next file
    /// boundary once triggered
    pub cancel: CancellationToken,
}

impl StageView {
    /// Fetch a dependency's output, raising `DependencyUnavailable` when the
    /// dependency failed, was disabled, or has not run.
    pub fn require(&self, analyzer: AnalyzerKind, dependency: AnalyzerKind) -> Result<&AnalyzerOutput> {
        self.outputs.get(&dependency).ok_or_else(|| {
            RepoqError::DependencyUnavailable {
                analyzer: analyzer.to_string(),
                dependency: dependency.to_string(),
            }
        })
    }

    /// Structure facts, for analyzers depending on Structure.
    pub fn structure(&self, analyzer: AnalyzerKind) -> Result<&StructureFacts> {
        match self.require(analyzer, AnalyzerKind::Structure)? {
            AnalyzerOutput::Structure(facts) => Ok(facts),
            other => Err(mismatch(analyzer, AnalyzerKind::Structure, other)),
        }
    }

    /// Complexity facts, for analyzers depending on Complexity.
    pub fn complexity(&self, analyzer: AnalyzerKind) -> Result<&ComplexityFacts> {
        match self.require(analyzer, AnalyzerKind::Complexity)? {
            AnalyzerOutput::Complexity(facts) => Ok(facts),
            other => Err(mismatch(analyzer, AnalyzerKind::Complexity, other)),
        }
    }

    /// History facts, for analyzers depending on History.
    pub fn history(&self, analyzer: AnalyzerKind) -> Result<&HistoryFacts> {
        match self.require(analyzer, AnalyzerKind::History)? {
            AnalyzerOutput::History(facts) => Ok(facts),
            other => Err(mismatch(analyzer, AnalyzerKind::History, other)),
        }
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn mismatch(analyzer: AnalyzerKind, dependency: AnalyzerKind, got: &AnalyzerOutput) -> RepoqError {
    RepoqError::internal(format!(
        "analyzer '{analyzer}' received mismatched output for dependency '{dependency}': {got:?}"
    ))
}

#[cfg(test)]
pub mod test_support {
    //! Stage-view fixtures shared by analyzer unit tests.

    use super::*;
    use crate::providers::LexicalMeasurementProvider;

    /// A stage view over a snapshot with no prior outputs.
    pub fn view_for(snapshot: Snapshot) -> StageView {
        view_with_outputs(snapshot, BTreeMap::new())
    }

    /// A stage view with the given prior-stage outputs.
    pub fn view_with_outputs(
        snapshot: Snapshot,
        outputs: BTreeMap<AnalyzerKind, AnalyzerOutput>,
    ) -> StageView {
        StageView {
            snapshot: Arc::new(snapshot),
            policy: Arc::new(Policy::default()),
            normalizer: Arc::new(Normalizer::new()),
            measurement: Arc::new(LexicalMeasurementProvider::new()),
            outputs: Arc::new(outputs),
            frozen_issues: Arc::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// A stage view with a custom policy and prior-stage outputs.
    pub fn view_with_policy(
        snapshot: Snapshot,
        policy: Policy,
        outputs: BTreeMap<AnalyzerKind, AnalyzerOutput>,
    ) -> StageView {
        StageView {
            snapshot: Arc::new(snapshot),
            policy: Arc::new(policy),
            normalizer: Arc::new(Normalizer::new()),
            measurement: Arc::new(LexicalMeasurementProvider::new()),
            outputs: Arc::new(outputs),
            frozen_issues: Arc::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }
}
