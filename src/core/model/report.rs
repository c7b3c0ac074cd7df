//! Quality report types: the risk vector, Q, PCQ, hotspots, and the
//! refactoring plan.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Index into the normalized risk vector x ∈ [0,1]^d.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskIndex {
    /// Mean complexity risk
    Complexity,
    /// Share of files flagged as hotspots
    HotspotRatio,
    /// TODO markers per KLOC
    TodoDensity,
    /// 1 - test coverage (or full deficit when coverage is unknown and CI absent)
    TestDeficit,
    /// 1 when no CI configuration is present
    CiAbsence,
    /// Layering violations, saturated per file count
    LayeringViolations,
    /// Circular dependency components, saturated per module count
    CircularDependencies,
}

impl RiskIndex {
    /// All risk indices in canonical order.
    pub const ALL: [RiskIndex; 7] = [
        RiskIndex::Complexity,
        RiskIndex::HotspotRatio,
        RiskIndex::TodoDensity,
        RiskIndex::TestDeficit,
        RiskIndex::CiAbsence,
        RiskIndex::LayeringViolations,
        RiskIndex::CircularDependencies,
    ];

    /// Stable snake_case name used in policy documents and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::HotspotRatio => "hotspot_ratio",
            Self::TodoDensity => "todo_density",
            Self::TestDeficit => "test_deficit",
            Self::CiAbsence => "ci_absence",
            Self::LayeringViolations => "layering_violations",
            Self::CircularDependencies => "circular_dependencies",
        }
    }
}

impl std::fmt::Display for RiskIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized risk vector; every component is in [0, 1]. Missing components
/// read as 0 (no measured risk).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskVector {
    values: BTreeMap<RiskIndex, f64>,
}

impl RiskVector {
    /// Create an all-zero risk vector.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Component value; absent components are 0.
    pub fn get(&self, index: RiskIndex) -> f64 {
        self.values.get(&index).copied().unwrap_or(0.0)
    }

    /// Set a component, clamping into [0, 1]. Returns true when the raw
    /// value was out of bounds.
    pub fn set(&mut self, index: RiskIndex, value: f64) -> bool {
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let was_out_of_bounds = clamped != value;
        self.values.insert(index, clamped);
        was_out_of_bounds
    }

    /// Iterate components in canonical index order.
    pub fn iter(&self) -> impl Iterator<Item = (RiskIndex, f64)> + '_ {
        RiskIndex::ALL.iter().map(|ix| (*ix, self.get(*ix)))
    }

    /// True when every component of `self` is <= the matching component of
    /// `other`.
    pub fn dominated_by(&self, other: &Self) -> bool {
        RiskIndex::ALL
            .iter()
            .all(|ix| self.get(*ix) <= other.get(*ix))
    }
}

/// A file ranked by hotness = normalized complexity × normalized churn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    /// File path
    pub path: PathBuf,
    /// Hotness score in [0, 1]
    pub hotness: f64,
    /// Churn of the file, retained for the ordering tie-break
    pub churn: usize,
}

/// Action tag on a recommendation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposedAction {
    /// Break down high-complexity functions
    ReduceComplexity,
    /// Split an oversized module
    SplitModule,
    /// Raise test coverage for the module
    AddTests,
    /// Burn down TODO/FIXME markers
    ResolveTodos,
    /// Remove layering violations and dependency cycles
    UntangleDependencies,
    /// Bring docstrings in sync with signatures
    ImproveDocs,
}

impl ProposedAction {
    /// Stable snake_case name used in exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReduceComplexity => "reduce_complexity",
            Self::SplitModule => "split_module",
            Self::AddTests => "add_tests",
            Self::ResolveTodos => "resolve_todos",
            Self::UntangleDependencies => "untangle_dependencies",
            Self::ImproveDocs => "improve_docs",
        }
    }
}

/// One task in the refactoring plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationTask {
    /// Position in the plan, 0-based; doubles as the task id
    pub ordinal: usize,
    /// Target module path
    pub module: String,
    /// Proposed action
    pub action: ProposedAction,
    /// Expected per-module utility improvement, bounded by the policy's
    /// per-action maximum
    pub delta_u: f64,
    /// Expected Q improvement attributable to this task (non-negative)
    pub estimated_delta_q: f64,
    /// Effort estimate in hours
    pub estimated_effort_hours: f64,
    /// Ordinal of a prior task this one depends on, if any
    pub depends_on: Option<usize>,
}

/// Ordered refactoring plan generated by the PCE witness constructor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefactoringPlan {
    /// Tasks in execution order
    pub tasks: Vec<RecommendationTask>,
}

impl RefactoringPlan {
    /// An empty plan.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the plan has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Sum of estimated ΔQ over all tasks.
    pub fn total_delta_q(&self) -> f64 {
        self.tasks.iter().map(|t| t.estimated_delta_q).sum()
    }
}

/// The aggregated quality report for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Quality score Q ∈ [0, q_max]
    pub q: f64,
    /// Upper bound of the quality scale
    pub q_max: f64,
    /// Normalized risk vector
    pub risks: RiskVector,
    /// Per-component quality: min over module utilities
    pub pcq: f64,
    /// Per-module utility scores in [0, 1], keyed by module path
    pub module_utilities: BTreeMap<String, f64>,
    /// Count of critical issues, tracked for the gate's hard constraints
    pub critical_issue_count: usize,
    /// Prioritized refactoring plan
    pub plan: RefactoringPlan,
}

impl QualityReport {
    /// Report for an empty repository: no risk, perfect PCQ, empty plan.
    pub fn pristine(q_max: f64) -> Self {
        Self {
            q: q_max,
            q_max,
            risks: RiskVector::zero(),
            pcq: 1.0,
            module_utilities: BTreeMap::new(),
            critical_issue_count: 0,
            plan: RefactoringPlan::empty(),
        }
    }
}
