//! Quality engine: the risk vector, Q, PCQ, and the refactoring plan.
//!
//! The engine is total over a sealed set of analysis facts: out-of-bounds
//! inputs are clamped and reported as diagnostics, zero denominators read as
//! zero risk, and sums run in stable module-path order.

pub mod pce;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::Policy;
use crate::core::model::{
    FileFacts, Hotspot, Issue, IssueKind, ModuleFacts, QualityReport, RiskIndex, RiskVector,
    Severity,
};
use crate::detectors::TestSummary;

pub use pce::PceGenerator;

/// The measured quantities the engine normalizes into the risk vector.
#[derive(Debug, Clone)]
pub struct QualityInputs<'a> {
    /// Per-file facts
    pub files: &'a BTreeMap<PathBuf, FileFacts>,
    /// Module partition
    pub modules: &'a BTreeMap<String, ModuleFacts>,
    /// Frozen issues
    pub issues: &'a [Issue],
    /// Ranked hotspots
    pub hotspots: &'a [Hotspot],
    /// CI presence, when the CI analyzer ran
    pub ci_present: Option<bool>,
    /// Parsed test outcomes, when a report was found
    pub test_summary: Option<TestSummary>,
    /// Layering violations found
    pub layering_violations: usize,
    /// Circular-dependency components found
    pub circular_dependencies: usize,
}

/// What the engine hands back: the report plus any findings about its own
/// inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutcome {
    /// The quality report
    pub report: QualityReport,
    /// Diagnostic issues for clamped or inconsistent inputs
    pub issues: Vec<Issue>,
    /// Non-fatal diagnostics
    pub diagnostics: Vec<String>,
}

/// Computes Q, PCQ, and the refactoring plan from sealed facts.
#[derive(Debug, Clone)]
pub struct QualityEngine {
    policy: Policy,
}

impl QualityEngine {
    /// Create an engine over the policy in force.
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    /// Evaluate the quality report. Total: never fails on any sealed input.
    pub fn evaluate(&self, inputs: &QualityInputs<'_>) -> EngineOutcome {
        let mut issues = Vec::new();
        let mut diagnostics = Vec::new();

        let risks = self.risk_vector(inputs, &mut issues, &mut diagnostics);
        let q = self.score(&risks);
        let module_utilities = self.module_utilities(inputs);
        let pcq = module_utilities
            .values()
            .fold(1.0_f64, |acc, u| acc.min(*u));

        let critical_issue_count = inputs
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count();

        let generator = PceGenerator::new(&self.policy);
        let plan = generator.generate(&module_utilities, inputs.modules, q, self.policy.q_max);

        debug!(q, pcq, tasks = plan.tasks.len(), "quality evaluation complete");

        EngineOutcome {
            report: QualityReport {
                q,
                q_max: self.policy.q_max,
                risks,
                pcq,
                module_utilities,
                critical_issue_count,
                plan,
            },
            issues,
            diagnostics,
        }
    }

    /// `Q = clamp(q_max − Σ wᵢ·xᵢ − Φ(x), 0, q_max)`.
    pub fn score(&self, risks: &RiskVector) -> f64 {
        let weighted: f64 = RiskIndex::ALL
            .iter()
            .map(|ix| self.policy.weight(*ix) * risks.get(*ix))
            .sum();
        let q = self.policy.q_max - weighted - self.penalty(risks);
        q.clamp(0.0, self.policy.q_max)
    }

    /// Piecewise-linear penalty Φ with non-negative derivative per
    /// component: each risk above the knee contributes (x − knee) · slope.
    fn penalty(&self, risks: &RiskVector) -> f64 {
        let knee = self.policy.penalty.knee;
        let slope = self.policy.penalty.slope;
        RiskIndex::ALL
            .iter()
            .map(|ix| (risks.get(*ix) - knee).max(0.0) * slope)
            .sum()
    }

    /// Normalize measured quantities into x ∈ [0,1]^d. An empty repository
    /// has zero risk everywhere.
    fn risk_vector(
        &self,
        inputs: &QualityInputs<'_>,
        issues: &mut Vec<Issue>,
        diagnostics: &mut Vec<String>,
    ) -> RiskVector {
        let mut risks = RiskVector::zero();
        if inputs.files.is_empty() {
            return risks;
        }
        let norm = &self.policy.risk_normalization;
        let file_count = inputs.files.len() as f64;

        // Out-of-bounds file facts are clamped with a diagnostic finding
        let mut clamped_paths: Vec<PathBuf> = Vec::new();
        let mut checked_files: Vec<(&PathBuf, FileFacts)> = Vec::new();
        for (path, facts) in inputs.files {
            let mut facts = facts.clone();
            if !facts.clamp_into_bounds().is_empty() {
                clamped_paths.push(path.clone());
            }
            checked_files.push((path, facts));
        }
        for path in clamped_paths {
            issues.push(Issue::new(
                IssueKind::Other,
                Severity::Info,
                path.clone(),
                None,
                "measured facts were outside declared bounds and were clamped",
            ));
            diagnostics.push(format!("clamped out-of-bounds facts for {}", path.display()));
        }

        let measured: Vec<&FileFacts> = checked_files
            .iter()
            .filter(|(_, f)| f.language.is_source())
            .map(|(_, f)| f)
            .collect();

        let mean_complexity = if measured.is_empty() {
            0.0
        } else {
            measured.iter().map(|f| f.cyclomatic_complexity).sum::<f64>() / measured.len() as f64
        };
        risks.set(
            RiskIndex::Complexity,
            safe_div(mean_complexity, norm.complexity_saturation),
        );

        let hot_files = inputs
            .hotspots
            .iter()
            .filter(|h| h.hotness >= norm.hotspot_hotness_threshold)
            .count() as f64;
        risks.set(RiskIndex::HotspotRatio, safe_div(hot_files, file_count));

        let total_loc: usize = checked_files.iter().map(|(_, f)| f.loc).sum();
        let total_todos: usize = checked_files.iter().map(|(_, f)| f.todo_count).sum();
        let todos_per_kloc = safe_div(total_todos as f64, total_loc as f64 / 1000.0);
        risks.set(
            RiskIndex::TodoDensity,
            safe_div(todos_per_kloc, norm.todo_per_kloc_saturation),
        );

        risks.set(RiskIndex::TestDeficit, self.test_deficit(inputs, &checked_files));

        let ci_absence = match inputs.ci_present {
            Some(true) => 0.0,
            Some(false) => 1.0,
            None => {
                diagnostics.push("ci presence unknown; ci_absence risk read as 0".to_string());
                0.0
            }
        };
        risks.set(RiskIndex::CiAbsence, ci_absence);

        let violations_per_100 = safe_div(
            inputs.layering_violations as f64 * 100.0,
            file_count,
        );
        risks.set(
            RiskIndex::LayeringViolations,
            safe_div(violations_per_100, norm.layering_per_100_files_saturation),
        );

        let module_count = inputs.modules.len() as f64;
        let cycles_per_10 = safe_div(
            inputs.circular_dependencies as f64 * 10.0,
            module_count,
        );
        risks.set(
            RiskIndex::CircularDependencies,
            safe_div(cycles_per_10, norm.circular_per_10_modules_saturation),
        );

        risks
    }

    /// The test-deficit component: supplied coverage wins, then parsed test
    /// outcomes, then CI presence as a weak prior.
    fn test_deficit(
        &self,
        inputs: &QualityInputs<'_>,
        files: &[(&PathBuf, FileFacts)],
    ) -> f64 {
        let covered: Vec<f64> = files.iter().filter_map(|(_, f)| f.coverage).collect();
        if !covered.is_empty() {
            let mean = covered.iter().sum::<f64>() / covered.len() as f64;
            return (1.0 - mean).clamp(0.0, 1.0);
        }
        if let Some(summary) = &inputs.test_summary {
            return (1.0 - summary.pass_ratio()).clamp(0.0, 1.0);
        }
        match inputs.ci_present {
            Some(true) => 0.5,
            _ => 1.0,
        }
    }

    /// Per-module utility uⱼ ∈ [0,1]: an isotone map of module facts. Every
    /// component is a saturating risk share; utility is its complement.
    pub fn module_utilities(&self, inputs: &QualityInputs<'_>) -> BTreeMap<String, f64> {
        let norm = &self.policy.risk_normalization;
        let max_module_churn = inputs
            .modules
            .values()
            .map(|m| m.total_churn)
            .max()
            .unwrap_or(0) as f64;

        let mut issue_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (module, facts) in inputs.modules {
            let count = inputs
                .issues
                .iter()
                .filter(|issue| facts.members.contains(&issue.path))
                .count();
            issue_counts.insert(module.as_str(), count);
        }

        inputs
            .modules
            .iter()
            .map(|(module, facts)| {
                let complexity_share =
                    safe_div(facts.mean_complexity, norm.complexity_saturation).min(1.0);
                let todo_share = safe_div(
                    facts.total_todos as f64,
                    facts.total_loc as f64 / 1000.0 * norm.todo_per_kloc_saturation,
                )
                .min(1.0);
                let churn_share = safe_div(facts.total_churn as f64, max_module_churn).min(1.0);
                let issue_share = safe_div(
                    issue_counts.get(module.as_str()).copied().unwrap_or(0) as f64,
                    facts.members.len() as f64,
                )
                .min(1.0);

                let risk = 0.4 * complexity_share
                    + 0.25 * todo_share
                    + 0.2 * churn_share
                    + 0.15 * issue_share;
                (module.clone(), (1.0 - risk).clamp(0.0, 1.0))
            })
            .collect()
    }
}

/// Saturating division: zero or non-finite denominators read as 0, and the
/// quotient clamps into [0, 1].
fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0.0;
    }
    (numerator / denominator).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Language;

    fn facts(complexity: f64, loc: usize, todos: usize) -> FileFacts {
        FileFacts {
            language: Language::Python,
            cyclomatic_complexity: complexity,
            maintainability_index: 80.0,
            function_count: 3,
            loc,
            todo_count: todos,
            churn: 0,
            coverage: None,
        }
    }

    fn inputs_for<'a>(
        files: &'a BTreeMap<PathBuf, FileFacts>,
        modules: &'a BTreeMap<String, ModuleFacts>,
    ) -> QualityInputs<'a> {
        QualityInputs {
            files,
            modules,
            issues: &[],
            hotspots: &[],
            ci_present: Some(true),
            test_summary: None,
            layering_violations: 0,
            circular_dependencies: 0,
        }
    }

    #[test]
    fn empty_repository_is_pristine() {
        let files = BTreeMap::new();
        let modules = BTreeMap::new();
        let outcome = QualityEngine::new(Policy::default()).evaluate(&inputs_for(&files, &modules));

        approx::assert_relative_eq!(outcome.report.q, outcome.report.q_max);
        approx::assert_relative_eq!(outcome.report.pcq, 1.0);
        assert!(outcome.report.plan.is_empty());
    }

    #[test]
    fn q_is_monotone_under_risk_reduction() {
        let engine = QualityEngine::new(Policy::default());
        let mut high = RiskVector::zero();
        high.set(RiskIndex::Complexity, 0.9);
        high.set(RiskIndex::TodoDensity, 0.6);

        let mut low = RiskVector::zero();
        low.set(RiskIndex::Complexity, 0.5);
        low.set(RiskIndex::TodoDensity, 0.6);

        assert!(engine.score(&low) >= engine.score(&high));
    }

    #[test]
    fn penalty_kicks_in_above_the_knee() {
        let engine = QualityEngine::new(Policy::default());
        let mut at_knee = RiskVector::zero();
        at_knee.set(RiskIndex::Complexity, 0.8);
        let mut above = RiskVector::zero();
        above.set(RiskIndex::Complexity, 0.9);

        let weight = Policy::default().weight(RiskIndex::Complexity);
        let linear_gap = weight * 0.1;
        let actual_gap = engine.score(&at_knee) - engine.score(&above);
        assert!(actual_gap > linear_gap);
    }

    #[test]
    fn out_of_bounds_facts_are_clamped_with_diagnostics() {
        let mut files = BTreeMap::new();
        files.insert(PathBuf::from("a.py"), facts(5000.0, 100, 0));
        let modules = BTreeMap::new();

        let outcome = QualityEngine::new(Policy::default()).evaluate(&inputs_for(&files, &modules));
        assert!(outcome.issues.iter().any(|i| i.kind == IssueKind::Other));
        assert!(!outcome.diagnostics.is_empty());
    }

    #[test]
    fn pcq_is_a_lower_bound_on_module_utilities() {
        let mut files = BTreeMap::new();
        files.insert(PathBuf::from("a/x.py"), facts(30.0, 500, 10));
        files.insert(PathBuf::from("b/y.py"), facts(2.0, 100, 0));

        let mut modules = BTreeMap::new();
        let mut bad = ModuleFacts::empty(crate::core::model::Layer::Business);
        bad.members.insert(PathBuf::from("a/x.py"));
        bad.mean_complexity = 30.0;
        bad.total_loc = 500;
        bad.total_todos = 10;
        modules.insert("a".to_string(), bad);
        let mut good = ModuleFacts::empty(crate::core::model::Layer::Business);
        good.members.insert(PathBuf::from("b/y.py"));
        good.mean_complexity = 2.0;
        good.total_loc = 100;
        modules.insert("b".to_string(), good);

        let outcome = QualityEngine::new(Policy::default()).evaluate(&inputs_for(&files, &modules));
        for utility in outcome.report.module_utilities.values() {
            assert!(*utility >= outcome.report.pcq);
        }
        assert!(outcome.report.module_utilities["a"] < outcome.report.module_utilities["b"]);
    }
}
