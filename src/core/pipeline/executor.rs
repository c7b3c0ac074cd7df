//! Stage executor: runs the analyzer plan over a snapshot and seals the
//! result model.
//!
//! Stages run sequentially; analyzers within a stage run as parallel tasks.
//! Analyzer failures are contained: the failure is recorded, transitive
//! dependents are marked unavailable, and every independent analyzer keeps
//! going. Issues emitted by a stage are frozen at its boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::errors::{RepoqError, Result};
use crate::core::model::{FileFacts, Layer, ModuleFacts, ResultModel, ResultModelBuilder};
use crate::core::quality::{QualityEngine, QualityInputs};
use crate::core::registry::{AnalyzerKind, AnalyzerRegistry};
use crate::core::snapshot::Snapshot;
use crate::detectors::{AnalyzerOutput, AnalyzerRun};
use crate::io::cache::CacheKey;

use super::context::{AnalysisContext, StageView};

/// Orchestrates one analysis run.
pub struct AnalysisPipeline {
    registry: AnalyzerRegistry,
    context: AnalysisContext,
}

impl AnalysisPipeline {
    /// Create a pipeline over a registry and carried context.
    pub fn new(registry: AnalyzerRegistry, context: AnalysisContext) -> Self {
        Self { registry, context }
    }

    /// The carried context (cancellation, cache, guard).
    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }

    /// Run the full analysis and seal the result model.
    pub async fn analyze(&self, snapshot: Arc<Snapshot>) -> Result<ResultModel> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let policy = &self.context.policy;
        policy.validate()?;

        // Self-analysis counts against the meta-recursion budget
        let _recursion_token = if self.context.guard.is_self(&snapshot) {
            Some(self.context.guard.enter_recursion()?)
        } else {
            None
        };

        let enabled = policy.effective_enabled();
        let plan = self.registry.plan(&enabled)?;
        info!(
            %run_id,
            snapshot = %snapshot.id,
            analyzers = plan.analyzer_count(),
            stages = plan.stages.len(),
            "starting analysis"
        );

        let policy_hash = policy.content_hash();
        let mut builder = ResultModelBuilder::new(snapshot.id.clone(), policy_hash.clone());
        let mut outputs: BTreeMap<AnalyzerKind, AnalyzerOutput> = BTreeMap::new();
        let mut degraded: BTreeSet<AnalyzerKind> = BTreeSet::new();

        for (stage_ix, stage) in plan.stages.iter().enumerate() {
            if self.context.cancel.is_cancelled() {
                return Err(RepoqError::Cancelled {
                    stage: format!("stage-{stage_ix}"),
                });
            }
            self.check_resource_ceilings(started, stage_ix)?;

            let runnable: Vec<AnalyzerKind> = stage
                .iter()
                .filter(|kind| !degraded.contains(*kind))
                .copied()
                .collect();
            debug!(stage = stage_ix, analyzers = ?runnable, "running stage");

            let stage_results = self
                .run_stage(&snapshot, &runnable, &outputs, builder.frozen_issues())
                .await?;

            for (kind, outcome) in stage_results {
                match outcome {
                    Ok(run) => {
                        builder.stage_issues(run.issues.clone());
                        for diagnostic in &run.diagnostics {
                            builder.record_diagnostic(diagnostic.clone());
                        }
                        outputs.insert(kind, run.output);
                    }
                    Err(error) => {
                        self.contain_failure(kind, error, &mut builder, &mut degraded, &enabled);
                    }
                }
            }

            // Stage boundary: staged issues become immutable
            builder.freeze_stage();
        }

        self.assemble(&snapshot, &outputs, &mut builder);
        let model = self.finish(&outputs, builder);

        info!(
            %run_id,
            q = model.report.q,
            pcq = model.report.pcq,
            issues = model.issues.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );
        Ok(model)
    }

    /// Run one stage's analyzers as parallel tasks, honoring the
    /// per-analyzer timeout and the cache.
    async fn run_stage(
        &self,
        snapshot: &Arc<Snapshot>,
        stage: &[AnalyzerKind],
        outputs: &BTreeMap<AnalyzerKind, AnalyzerOutput>,
        frozen_issues: &[crate::core::model::Issue],
    ) -> Result<Vec<(AnalyzerKind, Result<AnalyzerRun>)>> {
        let shared_outputs = Arc::new(outputs.clone());
        let shared_issues = Arc::new(frozen_issues.to_vec());
        let timeout = self.context.policy.timeouts.per_analyzer();
        let policy_hash = self.context.policy.content_hash();

        let mut handles = Vec::with_capacity(stage.len());
        for kind in stage {
            let kind = *kind;
            let Some(analyzer) = self.registry.get(kind).cloned() else {
                handles.push(tokio::spawn(async move {
                    (
                        kind,
                        Err(RepoqError::internal(format!(
                            "analyzer '{kind}' scheduled but not registered"
                        ))),
                    )
                }));
                continue;
            };

            // Self-analysis level check wraps every invocation
            self.context
                .guard
                .check_level(snapshot, analyzer.info().tier)?;

            let cache_key = CacheKey {
                snapshot_id: snapshot.id.clone(),
                analyzer: kind,
                policy_hash: policy_hash.clone(),
                analyzer_version: analyzer.info().version,
            };
            if let Some(cached) = self.context.cache.get(&cache_key) {
                debug!(analyzer = %kind, "cache hit");
                handles.push(tokio::spawn(async move { (kind, Ok(cached)) }));
                continue;
            }

            let view = StageView {
                snapshot: Arc::clone(snapshot),
                policy: Arc::clone(&self.context.policy),
                normalizer: Arc::clone(&self.context.normalizer),
                measurement: Arc::clone(&self.context.measurement),
                outputs: Arc::clone(&shared_outputs),
                frozen_issues: Arc::clone(&shared_issues),
                cancel: self.context.cancel.clone(),
            };
            let cache = Arc::clone(&self.context.cache);

            handles.push(tokio::spawn(async move {
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, analyzer.run(view)).await {
                        Ok(result) => result,
                        Err(_) => Err(RepoqError::analyzer(
                            kind.to_string(),
                            format!("timed out after {limit:?}"),
                        )),
                    },
                    None => analyzer.run(view).await,
                };
                if let Ok(run) = &outcome {
                    cache.put(cache_key, run.clone());
                }
                (kind, outcome)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(join_error) => {
                    return Err(RepoqError::internal(format!(
                        "analyzer task panicked: {join_error}"
                    )))
                }
            }
        }
        // Deterministic handling order regardless of completion order
        results.sort_by_key(|(kind, _)| *kind);
        Ok(results)
    }

    /// Record a contained failure and mark transitive dependents
    /// unavailable. Fatal errors propagate instead.
    fn contain_failure(
        &self,
        kind: AnalyzerKind,
        error: RepoqError,
        builder: &mut ResultModelBuilder,
        degraded: &mut BTreeSet<AnalyzerKind>,
        enabled: &BTreeSet<AnalyzerKind>,
    ) {
        match &error {
            RepoqError::DependencyUnavailable { dependency, .. } => {
                warn!(analyzer = %kind, dependency = %dependency, "analyzer unavailable");
                builder.record_unavailable(kind.to_string(), dependency.clone());
            }
            _ => {
                warn!(analyzer = %kind, error = %error, "analyzer failed; containing");
                builder.record_failure(kind.to_string(), error.to_string());
            }
        }
        degraded.insert(kind);

        // Transitive dependents cannot run
        let mut changed = true;
        while changed {
            changed = false;
            for info in self.registry.infos() {
                if !enabled.contains(&info.kind) || degraded.contains(&info.kind) {
                    continue;
                }
                if let Some(missing) = info
                    .dependencies
                    .iter()
                    .find(|dep| degraded.contains(*dep) && enabled.contains(*dep))
                {
                    builder.record_unavailable(info.kind.to_string(), missing.to_string());
                    degraded.insert(info.kind);
                    changed = true;
                }
            }
        }
    }

    /// Check the wall-clock ceiling, the pipeline timeout, and the memory
    /// ceiling at a stage boundary.
    fn check_resource_ceilings(&self, started: Instant, stage_ix: usize) -> Result<()> {
        let resources = &self.context.policy.resources;
        if let Some(ceiling) = resources.wall_clock_ceiling_secs {
            if started.elapsed() > Duration::from_secs_f64(ceiling) {
                return Err(RepoqError::resource(
                    "wall_clock",
                    format!("ceiling of {ceiling}s exceeded at stage {stage_ix}"),
                ));
            }
        }
        if let Some(limit) = self.context.policy.timeouts.pipeline() {
            if started.elapsed() > limit {
                return Err(RepoqError::resource(
                    "pipeline_timeout",
                    format!("pipeline timeout of {limit:?} exceeded at stage {stage_ix}"),
                ));
            }
        }
        if let (Some(ceiling_mb), Some(rss_mb)) =
            (resources.memory_ceiling_mb, approximate_rss_mb())
        {
            if rss_mb > ceiling_mb {
                return Err(RepoqError::resource(
                    "memory",
                    format!("resident set {rss_mb} MiB exceeds ceiling {ceiling_mb} MiB"),
                ));
            }
        }
        Ok(())
    }

    /// Fold analyzer outputs into per-file facts and the module partition.
    fn assemble(
        &self,
        snapshot: &Snapshot,
        outputs: &BTreeMap<AnalyzerKind, AnalyzerOutput>,
        builder: &mut ResultModelBuilder,
    ) {
        let structure = match outputs.get(&AnalyzerKind::Structure) {
            Some(AnalyzerOutput::Structure(facts)) => Some(facts),
            _ => None,
        };
        let complexity = match outputs.get(&AnalyzerKind::Complexity) {
            Some(AnalyzerOutput::Complexity(facts)) => Some(facts),
            _ => None,
        };
        let history = match outputs.get(&AnalyzerKind::History) {
            Some(AnalyzerOutput::History(facts)) => Some(facts),
            _ => None,
        };
        let weakness = match outputs.get(&AnalyzerKind::Weakness) {
            Some(AnalyzerOutput::Weakness(facts)) => Some(facts),
            _ => None,
        };
        let architecture = match outputs.get(&AnalyzerKind::Architecture) {
            Some(AnalyzerOutput::Architecture(facts)) => Some(facts),
            _ => None,
        };
        let hotspots = match outputs.get(&AnalyzerKind::Hotspots) {
            Some(AnalyzerOutput::Hotspots(facts)) => Some(facts),
            _ => None,
        };

        let mut files: BTreeMap<PathBuf, FileFacts> = BTreeMap::new();
        for entry in &snapshot.files {
            let mut facts = FileFacts::unmeasured(entry.language);
            if let Some(structure) = structure {
                if let Some(loc) = structure.loc.get(&entry.path) {
                    facts.loc = *loc;
                }
            }
            if let Some(complexity) = complexity {
                if let Some(measure) = complexity.per_file.get(&entry.path) {
                    facts.cyclomatic_complexity = measure.complexity;
                    facts.maintainability_index = measure.maintainability;
                    facts.function_count = measure.function_count;
                }
            }
            if let Some(history) = history {
                facts.churn = history.churn.get(&entry.path).copied().unwrap_or(0);
            }
            if let Some(weakness) = weakness {
                facts.todo_count = weakness.todo_counts.get(&entry.path).copied().unwrap_or(0);
            }
            files.insert(entry.path.clone(), facts);
        }

        let mut modules: BTreeMap<String, ModuleFacts> = BTreeMap::new();
        if let Some(structure) = structure {
            for (module, members) in &structure.modules {
                let layer = architecture
                    .and_then(|a| a.module_layers.get(module))
                    .copied()
                    .unwrap_or(Layer::Business);
                let mut facts = ModuleFacts::empty(layer);
                let mut complexity_sum = 0.0;
                let mut measured = 0usize;
                for member in members {
                    facts.members.insert(member.clone());
                    if let Some(file) = files.get(member) {
                        facts.total_loc += file.loc;
                        facts.total_churn += file.churn;
                        facts.total_todos += file.todo_count;
                        if file.language.is_source() {
                            complexity_sum += file.cyclomatic_complexity;
                            measured += 1;
                        }
                    }
                }
                facts.mean_complexity = if measured > 0 {
                    complexity_sum / measured as f64
                } else {
                    0.0
                };
                modules.insert(module.clone(), facts);
            }
        }

        builder.set_files(files);
        builder.set_modules(modules);
        if let Some(hotspots) = hotspots {
            builder.set_hotspots(hotspots.hotspots.clone());
        }
        if let Some(history) = history {
            *builder.co_change_graph_mut() = history.co_change.clone();
        }
        if let Some(architecture) = architecture {
            *builder.dependency_graph_mut() = architecture.graph.clone();
        }
    }

    /// Run the quality engine over the assembled facts and seal the model.
    fn finish(
        &self,
        outputs: &BTreeMap<AnalyzerKind, AnalyzerOutput>,
        mut builder: ResultModelBuilder,
    ) -> ResultModel {
        let ci = match outputs.get(&AnalyzerKind::CiQm) {
            Some(AnalyzerOutput::CiQm(facts)) => Some(facts),
            _ => None,
        };
        let architecture = match outputs.get(&AnalyzerKind::Architecture) {
            Some(AnalyzerOutput::Architecture(facts)) => Some(facts),
            _ => None,
        };
        let hotspot_records = match outputs.get(&AnalyzerKind::Hotspots) {
            Some(AnalyzerOutput::Hotspots(facts)) => facts.hotspots.clone(),
            _ => Vec::new(),
        };

        let engine = QualityEngine::new((*self.context.policy).clone());
        let outcome = {
            let inputs = QualityInputs {
                files: builder.files(),
                modules: builder.modules(),
                issues: builder.frozen_issues(),
                hotspots: &hotspot_records,
                ci_present: ci.map(|c| c.ci_present),
                test_summary: ci.and_then(|c| c.test_summary),
                layering_violations: architecture.map(|a| a.violation_count).unwrap_or(0),
                circular_dependencies: architecture.map(|a| a.cycles.len()).unwrap_or(0),
            };
            engine.evaluate(&inputs)
        };

        // The engine's own findings land in a final frozen stage
        builder.stage_issues(outcome.issues);
        for diagnostic in outcome.diagnostics {
            builder.record_diagnostic(diagnostic);
        }
        builder.freeze_stage();

        builder.seal(outcome.report)
    }
}

/// Best-effort resident-set probe (Linux); `None` where unsupported.
fn approximate_rss_mb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096 / (1024 * 1024))
}
