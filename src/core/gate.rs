//! Admission gate: decides whether a HEAD analysis may replace BASE.
//!
//! Accept iff (H) no hard-constrained risk regressed, (P) PCQ_head ≥ τ, and
//! (Q) Q_head ≥ Q_base + ε. The gate never compensates: a hard regression
//! rejects regardless of how much Q improved. On rejection, the PCE
//! generator produces a constructive remediation plan for HEAD.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::Policy;
use crate::core::model::{RefactoringPlan, ResultModel, RiskIndex};
use crate::core::quality::PceGenerator;

/// Exit code for an accepted verdict.
pub const EXIT_ACCEPTED: i32 = 0;
/// Exit code for a rejected verdict.
pub const EXIT_REJECTED: i32 = 2;
/// Exit code for an infrastructure failure (uncaught error).
pub const EXIT_FAILURE: i32 = 3;

/// Why a verdict rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Reason {
    /// A hard-constrained risk regressed between BASE and HEAD
    HardConstraintRegression {
        /// The regressed risk index
        index: RiskIndex,
        /// BASE value
        base: f64,
        /// HEAD value
        head: f64,
    },
    /// Critical-issue count regressed between BASE and HEAD
    CriticalIssueRegression {
        /// BASE count
        base: usize,
        /// HEAD count
        head: usize,
    },
    /// PCQ_head fell short of τ
    PcqBelowThreshold {
        /// HEAD per-component quality
        pcq: f64,
        /// Required threshold
        tau: f64,
    },
    /// Q_head improved by less than ε
    InsufficientImprovement {
        /// Observed Q_head − Q_base
        delta_q: f64,
        /// Required minimum improvement
        epsilon: f64,
    },
}

/// Gate evaluation states. Rejection is terminal for the evaluated pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Created, not yet evaluated
    Pending,
    /// Predicates being evaluated
    Evaluating,
    /// Accepted; HEAD may replace BASE
    Accepted,
    /// Rejected; terminal
    Rejected,
}

/// The gate's decision with every subpredicate reported individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall decision
    pub accepted: bool,
    /// (H): no hard-constrained risk regressed
    pub hard_constraints_held: bool,
    /// (P): PCQ_head ≥ τ
    pub pcq_met: bool,
    /// (Q): Q_head ≥ Q_base + ε
    pub improvement_met: bool,
    /// Q of the HEAD analysis
    pub q_head: f64,
    /// Q of the BASE analysis
    pub q_base: f64,
    /// Q_head − Q_base, reported explicitly; the gate does not estimate
    /// measurement noise
    pub delta_q: f64,
    /// PCQ of the HEAD analysis
    pub pcq_head: f64,
    /// Rejection reasons, empty on acceptance
    pub reasons: Vec<Reason>,
    /// Remediation plan for HEAD, attached on rejection
    pub witness: Option<RefactoringPlan>,
}

impl Verdict {
    /// The collaborator-CLI exit code for this verdict.
    pub fn exit_code(&self) -> i32 {
        if self.accepted {
            EXIT_ACCEPTED
        } else {
            EXIT_REJECTED
        }
    }
}

/// Evaluates `(H) ∧ (P) ∧ (Q)` over a (BASE, HEAD) pair.
#[derive(Debug)]
pub struct AdmissionGate {
    policy: Policy,
    state: GateState,
}

impl AdmissionGate {
    /// Create a gate in the `Pending` state.
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            state: GateState::Pending,
        }
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Evaluate the admission predicate. Drives the state machine
    /// `Pending → Evaluating → (Accepted | Rejected)`.
    pub fn admit(&mut self, base: &ResultModel, head: &ResultModel) -> Verdict {
        self.state = GateState::Evaluating;

        let mut reasons = Vec::new();

        // (H): anti-compensation over the hard set, plus the critical-issue
        // count which is tracked outside the risk vector
        for index in &self.policy.hard_constraints {
            let base_value = base.report.risks.get(*index);
            let head_value = head.report.risks.get(*index);
            if head_value > base_value {
                reasons.push(Reason::HardConstraintRegression {
                    index: *index,
                    base: base_value,
                    head: head_value,
                });
            }
        }
        if head.report.critical_issue_count > base.report.critical_issue_count {
            reasons.push(Reason::CriticalIssueRegression {
                base: base.report.critical_issue_count,
                head: head.report.critical_issue_count,
            });
        }
        let hard_constraints_held = reasons.is_empty();

        // (P): PCQ threshold
        let pcq_met = head.report.pcq >= self.policy.tau;
        if !pcq_met {
            reasons.push(Reason::PcqBelowThreshold {
                pcq: head.report.pcq,
                tau: self.policy.tau,
            });
        }

        // (Q): strict improvement by ε
        let delta_q = head.report.q - base.report.q;
        let improvement_met = delta_q >= self.policy.epsilon;
        if !improvement_met {
            reasons.push(Reason::InsufficientImprovement {
                delta_q,
                epsilon: self.policy.epsilon,
            });
        }

        let accepted = hard_constraints_held && pcq_met && improvement_met;
        self.state = if accepted {
            GateState::Accepted
        } else {
            GateState::Rejected
        };

        // The rejection witness is a constructive plan over HEAD
        let witness = if accepted {
            None
        } else {
            let generator = PceGenerator::new(&self.policy);
            Some(generator.generate(
                &head.report.module_utilities,
                &head.modules,
                head.report.q,
                head.report.q_max,
            ))
        };

        info!(
            accepted,
            q_base = base.report.q,
            q_head = head.report.q,
            delta_q,
            pcq_head = head.report.pcq,
            "gate verdict"
        );

        Verdict {
            accepted,
            hard_constraints_held,
            pcq_met,
            improvement_met,
            q_head: head.report.q,
            q_base: base.report.q,
            delta_q,
            pcq_head: head.report.pcq,
            reasons,
            witness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{QualityReport, ResultModelBuilder, RiskVector};

    fn model_with(q: f64, pcq: f64, risks: RiskVector) -> ResultModel {
        let report = QualityReport {
            q,
            q_max: 100.0,
            risks,
            pcq,
            module_utilities: std::collections::BTreeMap::new(),
            critical_issue_count: 0,
            plan: crate::core::model::RefactoringPlan::empty(),
        };
        ResultModelBuilder::new("snap", "policy").seal(report)
    }

    fn risks_with(index: RiskIndex, value: f64) -> RiskVector {
        let mut risks = RiskVector::zero();
        risks.set(index, value);
        risks
    }

    #[test]
    fn accepts_strict_improvement() {
        let base = model_with(70.0, 0.9, RiskVector::zero());
        let head = model_with(75.0, 0.9, RiskVector::zero());

        let mut gate = AdmissionGate::new(Policy::default());
        let verdict = gate.admit(&base, &head);
        assert!(verdict.accepted);
        assert!(verdict.reasons.is_empty());
        assert!(verdict.witness.is_none());
        assert_eq!(gate.state(), GateState::Accepted);
        assert_eq!(verdict.exit_code(), EXIT_ACCEPTED);
    }

    #[test]
    fn hard_regression_rejects_despite_higher_q() {
        // HEAD trades a hard-constrained risk for Q: anti-compensation
        let base = model_with(70.0, 0.9, risks_with(RiskIndex::HotspotRatio, 0.2));
        let head = model_with(90.0, 0.9, risks_with(RiskIndex::HotspotRatio, 0.4));

        let mut gate = AdmissionGate::new(Policy::default());
        let verdict = gate.admit(&base, &head);
        assert!(!verdict.accepted);
        assert!(!verdict.hard_constraints_held);
        // Q values are still reported on the rejected verdict
        assert_eq!(verdict.q_head, 90.0);
        assert!(verdict.witness.is_some());
        assert_eq!(gate.state(), GateState::Rejected);
    }

    #[test]
    fn soft_risk_regression_alone_does_not_reject() {
        // TodoDensity is not in the default hard set
        let base = model_with(70.0, 0.9, risks_with(RiskIndex::TodoDensity, 0.1));
        let head = model_with(75.0, 0.9, risks_with(RiskIndex::TodoDensity, 0.5));

        let verdict = AdmissionGate::new(Policy::default()).admit(&base, &head);
        assert!(verdict.accepted);
    }

    #[test]
    fn pcq_below_tau_rejects_with_witness() {
        let base = model_with(70.0, 0.9, RiskVector::zero());
        let head = model_with(80.0, 0.5, RiskVector::zero());

        let verdict = AdmissionGate::new(Policy::default()).admit(&base, &head);
        assert!(!verdict.accepted);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::PcqBelowThreshold { .. })));
        assert!(verdict.witness.is_some());
    }

    #[test]
    fn epsilon_bounds_the_required_improvement() {
        let base = model_with(70.0, 0.9, RiskVector::zero());
        let head = model_with(70.1, 0.9, RiskVector::zero());

        let verdict = AdmissionGate::new(Policy::default()).admit(&base, &head);
        assert!(!verdict.accepted);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::InsufficientImprovement { .. })));

        // With ε = 0, equal states are admissible (self-comparison policy)
        let mut relaxed = Policy::default();
        relaxed.epsilon = 0.0;
        let verdict = AdmissionGate::new(relaxed).admit(&base, &base);
        assert!(verdict.accepted);
        assert_eq!(verdict.delta_q, 0.0);
    }

    #[test]
    fn critical_issue_regression_rejects() {
        let base = model_with(70.0, 0.9, RiskVector::zero());
        let mut head = model_with(80.0, 0.9, RiskVector::zero());
        head.report.critical_issue_count = 2;

        let verdict = AdmissionGate::new(Policy::default()).admit(&base, &head);
        assert!(!verdict.accepted);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::CriticalIssueRegression { .. })));
    }
}
