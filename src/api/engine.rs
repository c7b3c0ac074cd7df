//! High-level engine interface: `analyze`, `gate`, `normalize`.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::Policy;
use crate::core::errors::Result;
use crate::core::gate::{AdmissionGate, Verdict};
use crate::core::model::ResultModel;
use crate::core::normalize::{ArtifactKind, CanonicalForm, Normalizer};
use crate::core::pipeline::{AnalysisContext, AnalysisPipeline};
use crate::core::registry::AnalyzerRegistry;
use crate::core::snapshot::{RepositoryLoader, Snapshot};
use crate::detectors::register_default_analyzers;
use crate::providers::{
    CommitHistoryProvider, LexicalMeasurementProvider, MeasurementProvider, NullHistoryProvider,
};

/// The engine facade owning the registry, providers, and carried context.
pub struct RepoqEngine {
    pipeline: AnalysisPipeline,
    history: Arc<dyn CommitHistoryProvider>,
    policy: Policy,
}

impl RepoqEngine {
    /// Create an engine with the reference providers (lexical measurement,
    /// no history source). Runs the normalizer's confluence self-check
    /// before accepting any work.
    pub fn new(policy: Policy) -> Result<Self> {
        Self::with_providers(
            policy,
            Arc::new(LexicalMeasurementProvider::new()),
            Arc::new(NullHistoryProvider),
        )
    }

    /// Create an engine with custom collaborator providers.
    pub fn with_providers(
        policy: Policy,
        measurement: Arc<dyn MeasurementProvider>,
        history: Arc<dyn CommitHistoryProvider>,
    ) -> Result<Self> {
        policy.validate()?;
        Normalizer::new().self_check()?;

        let mut registry = AnalyzerRegistry::new();
        register_default_analyzers(&mut registry, Arc::clone(&measurement));
        let context = AnalysisContext::new(policy.clone(), measurement);

        info!(analyzers = registry.len(), "engine initialized");
        Ok(Self {
            pipeline: AnalysisPipeline::new(registry, context),
            history,
            policy,
        })
    }

    /// Load a snapshot of `path` at `reference` using the configured
    /// history provider and the engine's policy.
    pub fn load(&self, path: &Path, reference: &str) -> Result<Snapshot> {
        RepositoryLoader::new(Arc::clone(&self.history)).load(path, reference, &self.policy)
    }

    /// Analyze a snapshot into a sealed result model.
    pub async fn analyze(&self, snapshot: Arc<Snapshot>) -> Result<ResultModel> {
        self.pipeline.analyze(snapshot).await
    }

    /// Load and analyze in one step.
    pub async fn analyze_path(&self, path: &Path, reference: &str) -> Result<ResultModel> {
        let snapshot = Arc::new(self.load(path, reference)?);
        self.analyze(snapshot).await
    }

    /// Evaluate the admission gate over a (BASE, HEAD) pair.
    pub fn gate(&self, base: &ResultModel, head: &ResultModel) -> Verdict {
        AdmissionGate::new(self.policy.clone()).admit(base, head)
    }

    /// Normalize an artifact to its canonical form.
    pub fn normalize(&self, artifact: &str, kind: ArtifactKind) -> Result<CanonicalForm> {
        self.pipeline.context().normalizer.normalize(artifact, kind)
    }

    /// The cancellation token for the current context; cancelling it makes
    /// in-flight analyses return promptly without a model.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.pipeline.context().cancel.clone()
    }

    /// The policy in force.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
