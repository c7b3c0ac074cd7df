//! Policy types and management for repoq-rs.
//!
//! The policy is the single structured, version-tagged input controlling an
//! analysis run: risk weights, gate thresholds, analyzer selection, resource
//! bounds, and layering rules. It is carried explicitly through the pipeline
//! as part of the analysis context; there is no process-wide configuration.

pub mod validation;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{RepoqError, Result};
use crate::core::model::{Layer, RiskIndex};
use crate::core::registry::AnalyzerKind;

pub use validation::{
    validate_non_negative, validate_positive_f64, validate_positive_usize, validate_unit_range,
};

/// Current policy document format version.
pub const POLICY_VERSION: u32 = 1;

/// A known-vulnerable dependency range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    /// Advisory identifier (e.g. "RUSTSEC-2024-0001")
    pub id: String,
    /// Package name as it appears in the dependency manifest
    pub package: String,
    /// Affected version range, normalizer syntax
    pub affected_range: String,
}

/// Per-analyzer and whole-pipeline timeouts, in seconds. `None` disables the
/// corresponding timeout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// Timeout applied to each analyzer invocation
    #[serde(default)]
    pub per_analyzer_secs: Option<f64>,
    /// Timeout applied to the whole pipeline
    #[serde(default)]
    pub pipeline_secs: Option<f64>,
}

impl TimeoutPolicy {
    /// Per-analyzer timeout as a `Duration`, when configured.
    pub fn per_analyzer(&self) -> Option<Duration> {
        self.per_analyzer_secs.map(Duration::from_secs_f64)
    }

    /// Whole-pipeline timeout as a `Duration`, when configured.
    pub fn pipeline(&self) -> Option<Duration> {
        self.pipeline_secs.map(Duration::from_secs_f64)
    }
}

/// Memory and wall-clock ceilings for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Memory ceiling in megabytes
    #[serde(default)]
    pub memory_ceiling_mb: Option<u64>,
    /// Wall-clock ceiling in seconds
    #[serde(default)]
    pub wall_clock_ceiling_secs: Option<f64>,
}

/// Stratification bounds for self-analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratificationPolicy {
    /// Maximum universe level permitted on the analyzer's own source tree.
    /// 0 = parse-only, 1 = metrics, 2 = ontological mapping. Level 3 is
    /// never permitted on the self path.
    #[serde(default = "StratificationPolicy::default_max_self_level")]
    pub max_self_level: u8,
    /// Maximum meta-analysis recursion depth
    #[serde(default = "StratificationPolicy::default_max_depth")]
    pub max_depth: u8,
}

impl StratificationPolicy {
    const fn default_max_self_level() -> u8 {
        2
    }

    const fn default_max_depth() -> u8 {
        5
    }
}

impl Default for StratificationPolicy {
    fn default() -> Self {
        Self {
            max_self_level: Self::default_max_self_level(),
            max_depth: Self::default_max_depth(),
        }
    }
}

/// Saturation constants for the risk normalization maps. Each raw quantity
/// divides by its saturation bound and clamps into [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskNormalization {
    /// Mean cyclomatic complexity that saturates the complexity risk
    #[serde(default = "RiskNormalization::default_complexity_saturation")]
    pub complexity_saturation: f64,
    /// TODO markers per KLOC that saturate the TODO-density risk
    #[serde(default = "RiskNormalization::default_todo_per_kloc_saturation")]
    pub todo_per_kloc_saturation: f64,
    /// Layering violations per 100 files that saturate the layering risk
    #[serde(default = "RiskNormalization::default_layering_saturation")]
    pub layering_per_100_files_saturation: f64,
    /// Cycle components per 10 modules that saturate the circularity risk
    #[serde(default = "RiskNormalization::default_circular_saturation")]
    pub circular_per_10_modules_saturation: f64,
    /// Hotness at or above which a file counts toward the hotspot ratio
    #[serde(default = "RiskNormalization::default_hotspot_threshold")]
    pub hotspot_hotness_threshold: f64,
}

impl RiskNormalization {
    const fn default_complexity_saturation() -> f64 {
        20.0
    }

    const fn default_todo_per_kloc_saturation() -> f64 {
        10.0
    }

    const fn default_layering_saturation() -> f64 {
        5.0
    }

    const fn default_circular_saturation() -> f64 {
        3.0
    }

    const fn default_hotspot_threshold() -> f64 {
        0.25
    }
}

impl Default for RiskNormalization {
    fn default() -> Self {
        Self {
            complexity_saturation: Self::default_complexity_saturation(),
            todo_per_kloc_saturation: Self::default_todo_per_kloc_saturation(),
            layering_per_100_files_saturation: Self::default_layering_saturation(),
            circular_per_10_modules_saturation: Self::default_circular_saturation(),
            hotspot_hotness_threshold: Self::default_hotspot_threshold(),
        }
    }
}

/// Piecewise-linear penalty Φ(x): each component above the knee contributes
/// `(x_i - knee) * slope`. The derivative is non-negative in every component,
/// so Q stays monotone under risk reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    /// Knee position in [0, 1]
    #[serde(default = "PenaltyPolicy::default_knee")]
    pub knee: f64,
    /// Slope applied above the knee
    #[serde(default = "PenaltyPolicy::default_slope")]
    pub slope: f64,
}

impl PenaltyPolicy {
    const fn default_knee() -> f64 {
        0.8
    }

    const fn default_slope() -> f64 {
        25.0
    }
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            knee: Self::default_knee(),
            slope: Self::default_slope(),
        }
    }
}

/// Allowed dependency directions between architectural layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRules {
    /// For each source layer, the set of target layers it may depend on.
    /// A layer may always depend on itself.
    pub allowed: BTreeMap<Layer, BTreeSet<Layer>>,
}

impl LayerRules {
    /// The default layering matrix:
    /// Presentation → {Business, Infrastructure};
    /// Business → {Data, Infrastructure};
    /// Data → {Infrastructure}; Infrastructure → ∅.
    pub fn standard() -> Self {
        let mut allowed = BTreeMap::new();
        allowed.insert(
            Layer::Presentation,
            BTreeSet::from([Layer::Business, Layer::Infrastructure]),
        );
        allowed.insert(
            Layer::Business,
            BTreeSet::from([Layer::Data, Layer::Infrastructure]),
        );
        allowed.insert(Layer::Data, BTreeSet::from([Layer::Infrastructure]));
        allowed.insert(Layer::Infrastructure, BTreeSet::new());
        Self { allowed }
    }

    /// Whether an edge from `source` to `target` is permitted.
    pub fn permits(&self, source: Layer, target: Layer) -> bool {
        if source == target {
            return true;
        }
        self.allowed
            .get(&source)
            .map(|targets| targets.contains(&target))
            .unwrap_or(false)
    }
}

impl Default for LayerRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// The structured, version-tagged policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy document format version
    #[serde(default = "Policy::default_version")]
    pub version: u32,

    /// Risk-index weights; non-negative. The weighted risk sum is
    /// subtracted from q_max.
    #[serde(default = "Policy::default_weights")]
    pub weights: BTreeMap<RiskIndex, f64>,

    /// Risk indices enforced as hard (no-regression) constraints by the gate
    #[serde(default = "Policy::default_hard_constraints")]
    pub hard_constraints: BTreeSet<RiskIndex>,

    /// Minimum Q improvement required for admission
    #[serde(default = "Policy::default_epsilon")]
    pub epsilon: f64,

    /// Minimum PCQ required for admission
    #[serde(default = "Policy::default_tau")]
    pub tau: f64,

    /// Maximum number of tasks in a PCE witness plan
    #[serde(default = "Policy::default_k_witness_max")]
    pub k_witness_max: usize,

    /// Upper bound of the quality scale
    #[serde(default = "Policy::default_q_max")]
    pub q_max: f64,

    /// Maximum per-action utility improvement assumed by the PCE generator
    #[serde(default = "Policy::default_delta_u_max")]
    pub delta_u_max: f64,

    /// Number of hotspots to report
    #[serde(default = "Policy::default_hotspot_top_k")]
    pub hotspot_top_k: usize,

    /// Analyzers to run; empty means "all enabled by default"
    #[serde(default)]
    pub enabled_analyzers: BTreeSet<AnalyzerKind>,

    /// Timeout configuration
    #[serde(default)]
    pub timeouts: TimeoutPolicy,

    /// Resource ceilings
    #[serde(default)]
    pub resources: ResourcePolicy,

    /// Stratification bounds
    #[serde(default)]
    pub stratification: StratificationPolicy,

    /// Glob patterns excluded by the loader
    #[serde(default = "Policy::default_excluded_globs")]
    pub excluded_globs: Vec<String>,

    /// Maximum file count the loader will admit (0 = no limit)
    #[serde(default = "Policy::default_max_files")]
    pub max_files: usize,

    /// Override of the default layering matrix
    #[serde(default)]
    pub layer_rules: Option<LayerRules>,

    /// SPDX license expressions acceptable for this project
    #[serde(default)]
    pub license_allowlist: Vec<String>,

    /// The project's declared SPDX license expression
    #[serde(default)]
    pub spdx_project_license: Option<String>,

    /// Known-vulnerable dependency ranges
    #[serde(default)]
    pub advisories: Vec<Advisory>,

    /// Risk normalization saturation constants
    #[serde(default)]
    pub risk_normalization: RiskNormalization,

    /// Piecewise-linear penalty parameters
    #[serde(default)]
    pub penalty: PenaltyPolicy,

    /// Cache directory; `None` disables persistence (in-memory only)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new_with_defaults()
    }
}

impl Policy {
    /// Construct a policy using the canonical defaults shared by every
    /// public surface. Keeping this in one place prevents the surfaces from
    /// drifting apart.
    pub(crate) fn new_with_defaults() -> Self {
        Self {
            version: Self::default_version(),
            weights: Self::default_weights(),
            hard_constraints: Self::default_hard_constraints(),
            epsilon: Self::default_epsilon(),
            tau: Self::default_tau(),
            k_witness_max: Self::default_k_witness_max(),
            q_max: Self::default_q_max(),
            delta_u_max: Self::default_delta_u_max(),
            hotspot_top_k: Self::default_hotspot_top_k(),
            enabled_analyzers: BTreeSet::new(),
            timeouts: TimeoutPolicy::default(),
            resources: ResourcePolicy::default(),
            stratification: StratificationPolicy::default(),
            excluded_globs: Self::default_excluded_globs(),
            max_files: Self::default_max_files(),
            layer_rules: None,
            license_allowlist: Vec::new(),
            spdx_project_license: None,
            advisories: Vec::new(),
            risk_normalization: RiskNormalization::default(),
            penalty: PenaltyPolicy::default(),
            cache_dir: None,
        }
    }

    const fn default_version() -> u32 {
        POLICY_VERSION
    }

    fn default_weights() -> BTreeMap<RiskIndex, f64> {
        BTreeMap::from([
            (RiskIndex::Complexity, 25.0),
            (RiskIndex::HotspotRatio, 15.0),
            (RiskIndex::TodoDensity, 10.0),
            (RiskIndex::TestDeficit, 20.0),
            (RiskIndex::CiAbsence, 10.0),
            (RiskIndex::LayeringViolations, 10.0),
            (RiskIndex::CircularDependencies, 10.0),
        ])
    }

    fn default_hard_constraints() -> BTreeSet<RiskIndex> {
        BTreeSet::from([
            RiskIndex::TestDeficit,
            RiskIndex::HotspotRatio,
            RiskIndex::LayeringViolations,
            RiskIndex::CircularDependencies,
        ])
    }

    const fn default_epsilon() -> f64 {
        0.2
    }

    const fn default_tau() -> f64 {
        0.80
    }

    const fn default_k_witness_max() -> usize {
        10
    }

    const fn default_q_max() -> f64 {
        100.0
    }

    const fn default_delta_u_max() -> f64 {
        0.15
    }

    const fn default_hotspot_top_k() -> usize {
        10
    }

    fn default_excluded_globs() -> Vec<String> {
        vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
            "**/__pycache__/**".to_string(),
            "**/dist/**".to_string(),
            "**/build/**".to_string(),
        ]
    }

    const fn default_max_files() -> usize {
        5000
    }

    /// Load a policy from a YAML file.
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            RepoqError::io(format!("Failed to read policy file: {}", path.display()), e)
        })?;
        let policy: Self = serde_yaml::from_str(&content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Save the policy to a YAML file.
    pub fn to_yaml_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|e| {
            RepoqError::io(
                format!("Failed to write policy file: {}", path.display()),
                e,
            )
        })
    }

    /// Validate all numeric fields against their declared bounds.
    pub fn validate(&self) -> Result<()> {
        if self.version != POLICY_VERSION {
            return Err(RepoqError::policy_field(
                format!(
                    "unsupported policy version {} (expected {})",
                    self.version, POLICY_VERSION
                ),
                "version",
            ));
        }
        for (index, weight) in &self.weights {
            validate_non_negative(*weight, index.as_str())?;
        }
        validate_non_negative(self.epsilon, "epsilon")?;
        validate_unit_range(self.tau, "tau")?;
        validate_positive_f64(self.q_max, "q_max")?;
        validate_unit_range(self.delta_u_max, "delta_u_max")?;
        validate_positive_usize(self.k_witness_max, "k_witness_max")?;
        validate_unit_range(self.penalty.knee, "penalty.knee")?;
        validate_non_negative(self.penalty.slope, "penalty.slope")?;
        validate_positive_f64(
            self.risk_normalization.complexity_saturation,
            "risk_normalization.complexity_saturation",
        )?;
        validate_positive_f64(
            self.risk_normalization.todo_per_kloc_saturation,
            "risk_normalization.todo_per_kloc_saturation",
        )?;
        if let Some(secs) = self.timeouts.per_analyzer_secs {
            validate_positive_f64(secs, "timeouts.per_analyzer_secs")?;
        }
        if let Some(secs) = self.timeouts.pipeline_secs {
            validate_positive_f64(secs, "timeouts.pipeline_secs")?;
        }
        Ok(())
    }

    /// The set of analyzers this policy enables: the explicit set when
    /// non-empty, otherwise every analyzer enabled by default.
    pub fn effective_enabled(&self) -> BTreeSet<AnalyzerKind> {
        if self.enabled_analyzers.is_empty() {
            AnalyzerKind::ALL.into_iter().collect()
        } else {
            self.enabled_analyzers.clone()
        }
    }

    /// Weight of a risk index; unnamed indices weigh 0.
    pub fn weight(&self, index: RiskIndex) -> f64 {
        self.weights.get(&index).copied().unwrap_or(0.0)
    }

    /// The effective layering matrix.
    pub fn layer_rules(&self) -> LayerRules {
        self.layer_rules.clone().unwrap_or_default()
    }

    /// Stable content hash of the policy; part of snapshot identity and
    /// cache keys.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
    }
}
