//! The aggregated, immutable result model and its staged builder.
//!
//! A `ResultModel` is created atomically when the pipeline seals its builder
//! and is never mutated afterwards. Issues are appended by analyzers into a
//! staging set and frozen at each scheduler stage boundary; later stages can
//! observe earlier issues but cannot modify them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::Result;
use crate::core::model::facts::{FileFacts, ModuleFacts};
use crate::core::model::graphs::{CoChangeGraph, DependencyGraph};
use crate::core::model::issues::{Issue, IssueKind, Severity};
use crate::core::model::report::{Hotspot, QualityReport};

/// Immutable, fully-aggregated analysis result.
///
/// Iteration order over every collection is part of the contract: files and
/// modules by path, issues by (path, line, kind), hotspots in ranked order,
/// plan tasks in generation order. Given an identical snapshot identity and
/// policy, the canonical serialization is byte-identical across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultModel {
    /// Identity hash of the analyzed snapshot
    pub snapshot_id: String,
    /// Hash of the policy that produced this model
    pub policy_hash: String,
    /// Per-file facts, keyed by path
    pub files: BTreeMap<PathBuf, FileFacts>,
    /// Per-module facts, keyed by module path
    pub modules: BTreeMap<String, ModuleFacts>,
    /// All frozen issues in canonical order
    pub issues: Vec<Issue>,
    /// Ranked hotspots
    pub hotspots: Vec<Hotspot>,
    /// Directed file dependency graph
    pub dependency_graph: DependencyGraph,
    /// Weighted symmetric co-change graph
    pub co_change_graph: CoChangeGraph,
    /// Quality report (Q, risks, PCQ, plan)
    pub report: QualityReport,
    /// Analyzers that failed, with the recorded error message
    pub failed_analyzers: BTreeMap<String, String>,
    /// Analyzers skipped because a dependency did not produce output
    pub unavailable_analyzers: BTreeMap<String, String>,
    /// Non-fatal semantic diagnostics accumulated during analysis
    pub diagnostics: Vec<String>,
}

impl ResultModel {
    /// Canonical deterministic JSON serialization. All maps are ordered and
    /// no run-scoped identifiers (timestamps, run ids) are part of the
    /// model, so equal inputs serialize byte-identically.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Issues of a given kind, in canonical order.
    pub fn issues_of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    /// Number of issues at `Critical` severity.
    pub fn critical_issue_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Critical)
            .count()
    }

    /// Number of analyzed files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Staged builder for [`ResultModel`].
///
/// The pipeline owns exactly one builder per run. Analyzer outputs land here
/// between stages; `seal` consumes the builder and produces the immutable
/// model.
#[derive(Debug)]
pub struct ResultModelBuilder {
    snapshot_id: String,
    policy_hash: String,
    files: BTreeMap<PathBuf, FileFacts>,
    modules: BTreeMap<String, ModuleFacts>,
    frozen_issues: Vec<Issue>,
    staged_issues: Vec<Issue>,
    hotspots: Vec<Hotspot>,
    dependency_graph: DependencyGraph,
    co_change_graph: CoChangeGraph,
    failed_analyzers: BTreeMap<String, String>,
    unavailable_analyzers: BTreeMap<String, String>,
    diagnostics: Vec<String>,
}

impl ResultModelBuilder {
    /// Create a builder bound to a snapshot identity and policy hash.
    pub fn new(snapshot_id: impl Into<String>, policy_hash: impl Into<String>) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            policy_hash: policy_hash.into(),
            files: BTreeMap::new(),
            modules: BTreeMap::new(),
            frozen_issues: Vec::new(),
            staged_issues: Vec::new(),
            hotspots: Vec::new(),
            dependency_graph: DependencyGraph::new(),
            co_change_graph: CoChangeGraph::new(),
            failed_analyzers: BTreeMap::new(),
            unavailable_analyzers: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Stage an issue. Staged issues become visible to later stages only
    /// after [`Self::freeze_stage`].
    pub fn stage_issue(&mut self, issue: Issue) {
        self.staged_issues.push(issue);
    }

    /// Stage a batch of issues.
    pub fn stage_issues(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.staged_issues.extend(issues);
    }

    /// Freeze the current stage: staged issues move into the immutable set
    /// in canonical order and are deduplicated by identity.
    pub fn freeze_stage(&mut self) {
        if self.staged_issues.is_empty() {
            return;
        }
        debug!(staged = self.staged_issues.len(), "freezing stage issues");
        self.frozen_issues.append(&mut self.staged_issues);
        self.frozen_issues.sort_by(|a, b| a.canonical_cmp(b));
        self.frozen_issues.dedup_by(|a, b| a.id == b.id);
    }

    /// Issues frozen so far; visible to later stages, read-only.
    pub fn frozen_issues(&self) -> &[Issue] {
        &self.frozen_issues
    }

    /// Set the per-file facts map.
    pub fn set_files(&mut self, files: BTreeMap<PathBuf, FileFacts>) {
        self.files = files;
    }

    /// Mutable access to per-file facts for enrichment by later analyzers.
    pub fn files_mut(&mut self) -> &mut BTreeMap<PathBuf, FileFacts> {
        &mut self.files
    }

    /// Read access to per-file facts.
    pub fn files(&self) -> &BTreeMap<PathBuf, FileFacts> {
        &self.files
    }

    /// Set the module partition.
    pub fn set_modules(&mut self, modules: BTreeMap<String, ModuleFacts>) {
        self.modules = modules;
    }

    /// Read access to the module partition.
    pub fn modules(&self) -> &BTreeMap<String, ModuleFacts> {
        &self.modules
    }

    /// Mutable access to the module partition.
    pub fn modules_mut(&mut self) -> &mut BTreeMap<String, ModuleFacts> {
        &mut self.modules
    }

    /// Set the ranked hotspot list.
    pub fn set_hotspots(&mut self, hotspots: Vec<Hotspot>) {
        self.hotspots = hotspots;
    }

    /// Merge edges into the dependency graph.
    pub fn dependency_graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.dependency_graph
    }

    /// Read access to the dependency graph.
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependency_graph
    }

    /// Merge edges into the co-change graph.
    pub fn co_change_graph_mut(&mut self) -> &mut CoChangeGraph {
        &mut self.co_change_graph
    }

    /// Record a contained analyzer failure.
    pub fn record_failure(&mut self, analyzer: impl Into<String>, message: impl Into<String>) {
        self.failed_analyzers.insert(analyzer.into(), message.into());
    }

    /// Record an analyzer skipped because of a missing dependency.
    pub fn record_unavailable(&mut self, analyzer: impl Into<String>, dependency: impl Into<String>) {
        self.unavailable_analyzers
            .insert(analyzer.into(), dependency.into());
    }

    /// Record a non-fatal semantic diagnostic.
    pub fn record_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    /// Names of analyzers recorded as failed or unavailable so far.
    pub fn degraded_analyzers(&self) -> impl Iterator<Item = &String> {
        self.failed_analyzers
            .keys()
            .chain(self.unavailable_analyzers.keys())
    }

    /// Seal the builder into an immutable model.
    ///
    /// Any still-staged issues are frozen first. Issues referencing a path
    /// absent from the file map violate the model invariant; they are
    /// dropped and reported as diagnostics instead of poisoning the model.
    pub fn seal(mut self, report: QualityReport) -> ResultModel {
        self.freeze_stage();

        let files = self.files;
        let mut diagnostics = self.diagnostics;
        let issues: Vec<Issue> = self
            .frozen_issues
            .into_iter()
            .filter(|issue| {
                let known = files.contains_key(&issue.path);
                if !known {
                    diagnostics.push(format!(
                        "dropped issue {} ({}): path {} not in snapshot",
                        issue.id,
                        issue.kind,
                        issue.path.display()
                    ));
                }
                known
            })
            .collect();

        diagnostics.sort();
        diagnostics.dedup();

        ResultModel {
            snapshot_id: self.snapshot_id,
            policy_hash: self.policy_hash,
            files,
            modules: self.modules,
            issues,
            hotspots: self.hotspots,
            dependency_graph: self.dependency_graph,
            co_change_graph: self.co_change_graph,
            report,
            failed_analyzers: self.failed_analyzers,
            unavailable_analyzers: self.unavailable_analyzers,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::facts::Language;

    fn builder_with_file(path: &str) -> ResultModelBuilder {
        let mut builder = ResultModelBuilder::new("snap", "policy");
        let mut files = BTreeMap::new();
        files.insert(PathBuf::from(path), FileFacts::unmeasured(Language::Python));
        builder.set_files(files);
        builder
    }

    #[test]
    fn staged_issues_are_invisible_until_frozen() {
        let mut builder = builder_with_file("a.py");
        builder.stage_issue(Issue::new(
            IssueKind::TodoMarker,
            Severity::Minor,
            "a.py",
            Some(1),
            "TODO",
        ));
        assert!(builder.frozen_issues().is_empty());

        builder.freeze_stage();
        assert_eq!(builder.frozen_issues().len(), 1);
    }

    #[test]
    fn freezing_deduplicates_by_identity() {
        let mut builder = builder_with_file("a.py");
        for _ in 0..3 {
            builder.stage_issue(Issue::new(
                IssueKind::TodoMarker,
                Severity::Minor,
                "a.py",
                Some(1),
                "TODO",
            ));
        }
        builder.freeze_stage();
        assert_eq!(builder.frozen_issues().len(), 1);
    }

    #[test]
    fn sealing_drops_issues_with_unknown_paths() {
        let mut builder = builder_with_file("a.py");
        builder.stage_issue(Issue::new(
            IssueKind::TodoMarker,
            Severity::Minor,
            "ghost.py",
            Some(1),
            "TODO",
        ));

        let model = builder.seal(QualityReport::pristine(100.0));
        assert!(model.issues.is_empty());
        assert_eq!(model.diagnostics.len(), 1);
        assert!(model.diagnostics[0].contains("ghost.py"));
    }

    #[test]
    fn canonical_json_is_deterministic() {
        let build = || {
            let mut builder = builder_with_file("a.py");
            builder.stage_issue(Issue::new(
                IssueKind::TodoMarker,
                Severity::Minor,
                "a.py",
                Some(3),
                "TODO",
            ));
            builder.seal(QualityReport::pristine(100.0))
        };

        let first = build().to_canonical_json().unwrap();
        let second = build().to_canonical_json().unwrap();
        assert_eq!(first, second);
    }
}
