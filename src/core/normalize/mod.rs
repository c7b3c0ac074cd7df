//! Term-rewriting normalizer for license expressions, version ranges, and
//! metric expressions.
//!
//! Each artifact kind owns a terminating, locally confluent rule family over
//! the shared [`Term`] representation. The engine applies rules
//! innermost-leftmost to a fixpoint, verifying at every step that the shared
//! well-founded measure strictly decreases; the startup self-check reduces
//! divergent derivations of overlapping rules and fails loudly on any
//! critical pair that does not join.

pub mod license;
pub mod metric;
pub mod term;
pub mod version;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::errors::{RepoqError, Result};

pub use term::{CmpOp, Measure, Operator, Term};

/// Default rewriting step budget.
pub const DEFAULT_STEP_BUDGET: usize = 10_000;

/// Artifact kinds the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// SPDX-style license expression
    LicenseExpr,
    /// Conjunction of version inequalities
    VersionRange,
    /// Arithmetic metric expression
    MetricExpr,
}

impl ArtifactKind {
    /// Stable name used in errors and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicenseExpr => "LicenseExpr",
            Self::VersionRange => "VersionRange",
            Self::MetricExpr => "MetricExpr",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rewrite rule: a named partial function on terms, applied at a single
/// node. Rules must strictly decrease the shared measure; the engine
/// enforces this on every application.
pub struct RewriteRule {
    /// Rule name, used in self-check reports
    pub name: &'static str,
    /// Attempt the rewrite at this node
    pub apply: fn(&Term) -> Option<Term>,
}

/// The canonical form produced for an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalForm {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Canonical rendering (or the last-step term when unnormalized)
    pub text: String,
    /// False when the step budget ran out before reaching a normal form
    pub normalized: bool,
    /// Rewrite steps consumed
    pub steps: usize,
}

/// The term-rewriting normalizer. Pure; carried by value in the analysis
/// context rather than accessed globally.
#[derive(Debug, Clone)]
pub struct Normalizer {
    budget: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a normalizer with the default step budget.
    pub fn new() -> Self {
        Self {
            budget: DEFAULT_STEP_BUDGET,
        }
    }

    /// Override the step budget.
    pub fn with_budget(budget: usize) -> Self {
        Self { budget }
    }

    /// Normalize an artifact. Two artifacts with the same semantics under
    /// the rule set yield byte-identical canonical text.
    ///
    /// Budget exhaustion is recoverable: the result carries the last-step
    /// rendering with `normalized = false`. Parse failures and measure
    /// violations are errors.
    pub fn normalize(&self, artifact: &str, kind: ArtifactKind) -> Result<CanonicalForm> {
        let term = parse(artifact, kind)?;
        let rules = rules_for(kind);

        match reduce(term, rules, self.budget)? {
            Reduction::Normal { term, steps } => Ok(CanonicalForm {
                kind,
                text: term.render(),
                normalized: true,
                steps,
            }),
            Reduction::OutOfBudget { term, steps } => {
                warn!(
                    kind = %kind,
                    steps,
                    "normalization budget exhausted; returning unnormalized form"
                );
                Ok(CanonicalForm {
                    kind,
                    text: term.render(),
                    normalized: false,
                    steps,
                })
            }
        }
    }

    /// Startup self-check: for every seed artifact, every single-step
    /// successor must reduce to the same normal form the seed reduces to.
    /// A divergence is a broken rule set and fails the whole engine.
    pub fn self_check(&self) -> Result<()> {
        for kind in [
            ArtifactKind::LicenseExpr,
            ArtifactKind::VersionRange,
            ArtifactKind::MetricExpr,
        ] {
            let rules = rules_for(kind);
            for seed in critical_pair_seeds(kind) {
                let term = parse(seed, kind)?;
                let reference = match reduce(term.clone(), rules, self.budget)? {
                    Reduction::Normal { term, .. } => term.render(),
                    Reduction::OutOfBudget { .. } => {
                        return Err(RepoqError::ConfluenceSelfCheckFailed {
                            kind: kind.as_str().to_string(),
                            message: format!("seed '{seed}' did not terminate within budget"),
                        })
                    }
                };

                for (rule_name, successor) in successors(&term, rules) {
                    let joined = match reduce(successor, rules, self.budget)? {
                        Reduction::Normal { term, .. } => term.render(),
                        Reduction::OutOfBudget { .. } => {
                            return Err(RepoqError::ConfluenceSelfCheckFailed {
                                kind: kind.as_str().to_string(),
                                message: format!(
                                    "successor of '{seed}' via {rule_name} did not terminate"
                                ),
                            })
                        }
                    };
                    if joined != reference {
                        return Err(RepoqError::ConfluenceSelfCheckFailed {
                            kind: kind.as_str().to_string(),
                            message: format!(
                                "seed '{seed}': step via {rule_name} reduces to '{joined}', \
                                 expected '{reference}'"
                            ),
                        });
                    }
                }
            }
            debug!(kind = %kind, "confluence self-check passed");
        }
        Ok(())
    }
}

/// Parse an artifact into a term.
pub fn parse(artifact: &str, kind: ArtifactKind) -> Result<Term> {
    match kind {
        ArtifactKind::LicenseExpr => license::parse(artifact),
        ArtifactKind::VersionRange => version::parse(artifact),
        ArtifactKind::MetricExpr => metric::parse(artifact),
    }
}

/// The rule family for a kind.
pub fn rules_for(kind: ArtifactKind) -> &'static [RewriteRule] {
    match kind {
        ArtifactKind::LicenseExpr => license::rules(),
        ArtifactKind::VersionRange => version::rules(),
        ArtifactKind::MetricExpr => metric::rules(),
    }
}

/// Outcome of reducing a term.
enum Reduction {
    /// Reached a normal form
    Normal { term: Term, steps: usize },
    /// Budget ran out first
    OutOfBudget { term: Term, steps: usize },
}

/// Reduce to normal form or budget exhaustion, enforcing the measure on
/// every step.
fn reduce(mut term: Term, rules: &[RewriteRule], budget: usize) -> Result<Reduction> {
    let mut steps = 0usize;
    loop {
        if steps >= budget {
            return Ok(Reduction::OutOfBudget { term, steps });
        }
        let before = Measure::of(&term);
        match rewrite_once(&term, rules) {
            Some((rule_name, next)) => {
                let after = Measure::of(&next);
                if after >= before {
                    return Err(RepoqError::NonTerminating { rule: rule_name.to_string() });
                }
                term = next;
                steps += 1;
            }
            None => return Ok(Reduction::Normal { term, steps }),
        }
    }
}

/// Apply one rule at the innermost-leftmost applicable position.
fn rewrite_once(term: &Term, rules: &[RewriteRule]) -> Option<(&'static str, Term)> {
    if let Term::Op { op, args } = term {
        for (ix, arg) in args.iter().enumerate() {
            if let Some((name, rewritten)) = rewrite_once(arg, rules) {
                let mut next_args = args.clone();
                next_args[ix] = rewritten;
                return Some((name, Term::op(*op, next_args)));
            }
        }
    }
    for rule in rules {
        if let Some(next) = (rule.apply)(term) {
            return Some((rule.name, next));
        }
    }
    None
}

/// All single-step rewrites of `term`, at any position with any rule. Used
/// by the confluence self-check to explore divergent derivations.
fn successors(term: &Term, rules: &[RewriteRule]) -> Vec<(&'static str, Term)> {
    let mut out = Vec::new();
    for rule in rules {
        if let Some(next) = (rule.apply)(term) {
            out.push((rule.name, next));
        }
    }
    if let Term::Op { op, args } = term {
        for (ix, arg) in args.iter().enumerate() {
            for (name, rewritten) in successors(arg, rules) {
                let mut next_args = args.clone();
                next_args[ix] = rewritten;
                out.push((name, Term::op(*op, next_args)));
            }
        }
    }
    out
}

/// Seed artifacts whose reductions exercise every overlapping rule pair.
fn critical_pair_seeds(kind: ArtifactKind) -> &'static [&'static str] {
    match kind {
        ArtifactKind::LicenseExpr => &[
            "MIT AND MIT",
            "MIT AND TRUE",
            "MIT AND FALSE",
            "MIT OR TRUE",
            "MIT OR FALSE",
            "MIT OR (MIT AND Apache-2.0)",
            "MIT AND (MIT OR Apache-2.0)",
            "(Apache-2.0 OR MIT) AND MIT",
            "MIT AND (Apache-2.0 AND BSD-3-Clause)",
            "(MIT AND TRUE) OR (MIT AND MIT)",
            "BSD-3-Clause AND Apache-2.0 AND MIT AND MIT",
            "(MIT OR Apache-2.0) AND (Apache-2.0 OR MIT)",
        ],
        ArtifactKind::VersionRange => &[
            ">=1.2.3 <2.0.0 >=1.5.0",
            ">=2.0.0 <1.0.0",
            "=1.2.3 >=1.0.0",
            "=1.2.3 =1.2.3",
            "=1.0.0 =2.0.0",
            ">1.0.0 >=1.0.0 <3.0.0 <=2.0.0",
            "<1.0.0 <2.0.0 >=0.5.0",
            ">=1.0.0 <=1.0.0",
        ],
        ArtifactKind::MetricExpr => &[
            "1 + 2 * 3",
            "x + 0",
            "x * 1 + 0 * y",
            "x * 0",
            "(a + 0) * (1 * b)",
            "4 / 0",
            "2 - 0",
            "1000000000 * 1000000000 * 1000000000",
            "3 + x + 2",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_check_passes_for_frozen_rule_set() {
        Normalizer::new().self_check().unwrap();
    }

    #[test]
    fn license_examples_from_the_contract() {
        let normalizer = Normalizer::new();
        let canon = |s: &str| {
            normalizer
                .normalize(s, ArtifactKind::LicenseExpr)
                .unwrap()
                .text
        };
        assert_eq!(canon("MIT AND (MIT OR Apache-2.0)"), "MIT");
        assert_eq!(canon("MIT"), "MIT");
        assert_eq!(canon("(Apache-2.0 OR MIT) AND MIT"), "MIT");
    }

    #[test]
    fn version_examples_from_the_contract() {
        let normalizer = Normalizer::new();
        let canon = |s: &str| {
            normalizer
                .normalize(s, ArtifactKind::VersionRange)
                .unwrap()
                .text
        };
        assert_eq!(canon(">=1.2.3 <2.0.0 >=1.5.0"), ">=1.5.0 <2.0.0");
        assert_eq!(canon(">=2.0.0 <1.0.0"), "EMPTY");
    }

    #[test]
    fn normalization_is_idempotent_on_examples() {
        let normalizer = Normalizer::new();
        for (artifact, kind) in [
            ("MIT AND (MIT OR Apache-2.0)", ArtifactKind::LicenseExpr),
            (">=1.2.3 <2.0.0 >=1.5.0", ArtifactKind::VersionRange),
            ("x * 1 + 0", ArtifactKind::MetricExpr),
        ] {
            let once = normalizer.normalize(artifact, kind).unwrap();
            let twice = normalizer.normalize(&once.text, kind).unwrap();
            assert_eq!(once.text, twice.text);
            assert!(twice.normalized);
        }
    }

    #[test]
    fn budget_exhaustion_returns_unnormalized_form() {
        let normalizer = Normalizer::with_budget(1);
        let form = normalizer
            .normalize("MIT AND MIT AND MIT AND MIT", ArtifactKind::LicenseExpr)
            .unwrap();
        assert!(!form.normalized);
        assert_eq!(form.steps, 1);
    }

    #[test]
    fn never_mutates_input() {
        let artifact = "MIT AND (MIT OR Apache-2.0)";
        let owned = artifact.to_string();
        let _ = Normalizer::new().normalize(&owned, ArtifactKind::LicenseExpr);
        assert_eq!(owned, artifact);
    }
}
