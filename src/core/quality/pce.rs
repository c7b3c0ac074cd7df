//! Constructive k-witness generation (PCE).
//!
//! Given per-module utilities, the threshold τ, and the task budget k, the
//! generator greedily lifts the lowest-utility modules until either the
//! minimum reaches τ or the budget is spent. Each task's Δu is bounded by
//! the policy's per-action maximum; distinct actions on one module combine,
//! but a single action never repeats for a module, because overlapping Δu
//! from the same action does not add.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::config::Policy;
use crate::core::model::{ModuleFacts, ProposedAction, RecommendationTask, RefactoringPlan};

/// Action preference order per module, from its dominant deficiency down.
const ACTION_LADDER: [ProposedAction; 6] = [
    ProposedAction::ReduceComplexity,
    ProposedAction::ResolveTodos,
    ProposedAction::AddTests,
    ProposedAction::UntangleDependencies,
    ProposedAction::SplitModule,
    ProposedAction::ImproveDocs,
];

/// Generates the refactoring plan / rejection witness.
#[derive(Debug)]
pub struct PceGenerator<'a> {
    policy: &'a Policy,
}

impl<'a> PceGenerator<'a> {
    /// Create a generator over the policy in force.
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// Build a plan that raises `min uⱼ` to τ, bounded by `k_witness_max`
    /// tasks. An empty plan means PCQ already meets the threshold.
    pub fn generate(
        &self,
        utilities: &BTreeMap<String, f64>,
        modules: &BTreeMap<String, ModuleFacts>,
        q: f64,
        q_max: f64,
    ) -> RefactoringPlan {
        let tau = self.policy.tau;
        let k = self.policy.k_witness_max;
        let delta_max = self.policy.delta_u_max;

        let mut working: BTreeMap<&String, f64> = utilities.iter().map(|(m, u)| (m, *u)).collect();
        let mut actions_used: BTreeMap<&String, Vec<ProposedAction>> = BTreeMap::new();
        let mut last_task_for: BTreeMap<&String, usize> = BTreeMap::new();
        let mut tasks: Vec<RecommendationTask> = Vec::new();

        let total_loc: usize = modules.values().map(|m| m.total_loc).sum();
        // ΔQ estimates distribute the remaining headroom and never exceed it
        let headroom = (q_max - q).max(0.0);
        let mut delta_q_spent = 0.0;

        while tasks.len() < k {
            let Some((module, utility)) = lowest_module(&working, modules) else {
                break;
            };
            if utility >= tau {
                break;
            }

            let used = actions_used.entry(module).or_default();
            let Some(action) = ACTION_LADDER
                .iter()
                .find(|a| !used.contains(a))
                .copied()
            else {
                // Every non-overlapping action is planned; the module cannot
                // be lifted further under the declared bounds.
                debug!(module = %module, "action ladder exhausted");
                break;
            };
            used.push(action);

            let delta_u = (tau - utility).min(delta_max);
            let facts = modules.get(module.as_str());
            let loc = facts.map(|m| m.total_loc).unwrap_or(0);

            let loc_share = if total_loc > 0 {
                loc as f64 / total_loc as f64
            } else {
                1.0 / utilities.len().max(1) as f64
            };
            let estimated_delta_q =
                (headroom * delta_u * loc_share).min((headroom - delta_q_spent).max(0.0));
            delta_q_spent += estimated_delta_q;

            // Effort scales with how much of the module the action touches
            let estimated_effort_hours = (delta_u * loc as f64 / 50.0).max(0.5);

            let ordinal = tasks.len();
            let depends_on = last_task_for.get(module).copied();
            last_task_for.insert(module, ordinal);

            tasks.push(RecommendationTask {
                ordinal,
                module: module.clone(),
                action,
                delta_u,
                estimated_delta_q,
                estimated_effort_hours,
                depends_on,
            });

            if let Some(u) = working.get_mut(module) {
                *u = (*u + delta_u).min(1.0);
            }
        }

        debug!(tasks = tasks.len(), "witness generation complete");
        RefactoringPlan { tasks }
    }
}

/// The module with the lowest utility. Ties break by descending size in
/// lines, then ascending module path, so plans are reproducible.
fn lowest_module<'m>(
    utilities: &BTreeMap<&'m String, f64>,
    modules: &BTreeMap<String, ModuleFacts>,
) -> Option<(&'m String, f64)> {
    utilities
        .iter()
        .min_by(|(module_a, u_a), (module_b, u_b)| {
            u_a.partial_cmp(u_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let loc_a = modules.get(module_a.as_str()).map(|m| m.total_loc).unwrap_or(0);
                    let loc_b = modules.get(module_b.as_str()).map(|m| m.total_loc).unwrap_or(0);
                    loc_b.cmp(&loc_a)
                })
                .then_with(|| module_a.cmp(module_b))
        })
        .map(|(module, utility)| (*module, *utility))
}
