//! Analysis pipeline: carried context, stage views, and the executor.

pub mod context;
pub mod executor;

pub use context::{AnalysisContext, StageView};
pub use executor::AnalysisPipeline;

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::core::config::Policy;
    use crate::core::errors::{RepoqError, Result};
    use crate::core::model::IssueKind;
    use crate::core::registry::{AnalyzerInfo, AnalyzerKind, AnalyzerRegistry};
    use crate::core::snapshot::Snapshot;
    use crate::detectors::{register_default_analyzers, Analyzer, AnalyzerRun};
    use crate::providers::LexicalMeasurementProvider;

    use super::context::{AnalysisContext, StageView};
    use super::executor::AnalysisPipeline;

    fn default_pipeline(policy: Policy) -> AnalysisPipeline {
        let measurement = Arc::new(LexicalMeasurementProvider::new());
        let mut registry = AnalyzerRegistry::new();
        register_default_analyzers(&mut registry, measurement.clone());
        AnalysisPipeline::new(registry, AnalysisContext::new(policy, measurement))
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot::builder()
            .file(
                "core/pricing.py",
                "def price(amount, rate):\n    \"\"\"Price a trade.\n\n    Args:\n        amount: notional\n        rate: conversion rate\n    \"\"\"\n    if amount > 0:\n        return amount * rate\n    return 0\n",
            )
            .file("ui/screen.py", "import core.pricing\n# TODO polish layout\n")
            .build("test-policy")
    }

    #[tokio::test]
    async fn full_run_populates_the_model() {
        let pipeline = default_pipeline(Policy::default());
        let model = pipeline
            .analyze(Arc::new(sample_snapshot()))
            .await
            .unwrap();

        assert_eq!(model.file_count(), 2);
        assert_eq!(model.modules.len(), 2);
        assert!(model.report.q > 0.0);
        assert!(model.report.pcq > 0.0 && model.report.pcq <= 1.0);
        assert!(model
            .issues
            .iter()
            .any(|issue| issue.kind == IssueKind::TodoMarker));
        assert!(model.failed_analyzers.is_empty());
        assert_eq!(model.dependency_graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn result_model_is_deterministic() {
        let pipeline = default_pipeline(Policy::default());
        let first = pipeline
            .analyze(Arc::new(sample_snapshot()))
            .await
            .unwrap()
            .to_canonical_json()
            .unwrap();

        let second_pipeline = default_pipeline(Policy::default());
        let second = second_pipeline
            .analyze(Arc::new(sample_snapshot()))
            .await
            .unwrap()
            .to_canonical_json()
            .unwrap();

        assert_eq!(first, second);
    }

    /// Analyzer double that always fails, occupying the Complexity slot.
    struct FailingComplexity {
        info: AnalyzerInfo,
    }

    impl FailingComplexity {
        fn new() -> Self {
            Self {
                info: AnalyzerInfo::new(AnalyzerKind::Complexity, &[AnalyzerKind::Structure], 1),
            }
        }
    }

    #[async_trait]
    impl Analyzer for FailingComplexity {
        fn info(&self) -> &AnalyzerInfo {
            &self.info
        }

        async fn run(&self, _view: StageView) -> Result<AnalyzerRun> {
            Err(RepoqError::analyzer("complexity", "measurement backend raised"))
        }
    }

    #[tokio::test]
    async fn failure_is_contained_and_dependents_are_unavailable() {
        let measurement = Arc::new(LexicalMeasurementProvider::new());
        let mut registry = AnalyzerRegistry::new();
        register_default_analyzers(&mut registry, measurement.clone());
        registry.register(Arc::new(FailingComplexity::new()));

        let pipeline =
            AnalysisPipeline::new(registry, AnalysisContext::new(Policy::default(), measurement));
        let model = pipeline
            .analyze(Arc::new(sample_snapshot()))
            .await
            .unwrap();

        // The failure is recorded, its dependent is skipped, and everything
        // independent still ran
        assert!(model.failed_analyzers.contains_key("complexity"));
        assert_eq!(
            model.unavailable_analyzers.get("hotspots").map(String::as_str),
            Some("complexity")
        );
        assert!(!model.files.is_empty());
        assert!(model.issues.iter().any(|i| i.kind == IssueKind::TodoMarker));
    }

    #[tokio::test]
    async fn disabled_dependency_makes_dependents_unavailable() {
        let mut policy = Policy::default();
        policy.enabled_analyzers = BTreeSet::from([
            AnalyzerKind::Structure,
            AnalyzerKind::History,
            AnalyzerKind::Hotspots,
        ]);

        let pipeline = default_pipeline(policy);
        let model = pipeline
            .analyze(Arc::new(sample_snapshot()))
            .await
            .unwrap();

        assert_eq!(
            model.unavailable_analyzers.get("hotspots").map(String::as_str),
            Some("complexity")
        );
        assert!(model.failed_analyzers.is_empty());
    }

    #[tokio::test]
    async fn cancellation_yields_no_model() {
        let pipeline = default_pipeline(Policy::default());
        pipeline.context().cancel.cancel();

        let err = pipeline
            .analyze(Arc::new(sample_snapshot()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoqError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cache_serves_the_second_run() {
        let pipeline = default_pipeline(Policy::default());
        let snapshot = Arc::new(sample_snapshot());

        pipeline.analyze(Arc::clone(&snapshot)).await.unwrap();
        let cached_entries = pipeline.context().cache.len();
        assert!(cached_entries > 0);

        // Second run over the identical snapshot is served from cache and
        // produces the identical model
        let again = pipeline.analyze(snapshot).await.unwrap();
        assert_eq!(pipeline.context().cache.len(), cached_entries);
        assert!(again.report.q > 0.0);
    }
}
