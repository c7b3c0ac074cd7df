//! Property suites for the normalizer, quality engine, scheduler, gate, and
//! graphs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use proptest::prelude::*;

use repoq_rs::core::config::Policy;
use repoq_rs::core::gate::AdmissionGate;
use repoq_rs::core::model::{
    DependencyGraph, FileFacts, Language, Layer, ModuleFacts, QualityReport, RefactoringPlan,
    ResultModelBuilder, RiskIndex, RiskVector,
};
use repoq_rs::core::quality::{PceGenerator, QualityEngine, QualityInputs};
use repoq_rs::core::registry::{AnalyzerKind, AnalyzerRegistry};
use repoq_rs::detectors::register_default_analyzers;
use repoq_rs::providers::LexicalMeasurementProvider;
use repoq_rs::{ArtifactKind, Normalizer};

// ---------------------------------------------------------------------------
// Normalizer strategies
// ---------------------------------------------------------------------------

fn license_leaf() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "MIT".to_string(),
        "Apache-2.0".to_string(),
        "BSD-3-Clause".to_string(),
        "GPL-3.0-only".to_string(),
        "TRUE".to_string(),
        "FALSE".to_string(),
    ])
}

fn license_expr() -> impl Strategy<Value = String> {
    license_leaf().prop_recursive(3, 24, 3, |inner| {
        (
            prop::collection::vec(inner, 2..4),
            prop::sample::select(vec!["AND".to_string(), "OR".to_string()]),
        )
            .prop_map(|(args, op)| format!("({})", args.join(&format!(" {op} "))))
    })
}

fn version_range() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (
            prop::sample::select(vec![
                ">=".to_string(),
                "<=".to_string(),
                ">".to_string(),
                "<".to_string(),
                "=".to_string(),
            ]),
            0u64..4,
            0u64..4,
            0u64..4,
        ),
        1..4,
    )
    .prop_map(|constraints| {
        constraints
            .into_iter()
            .map(|(op, major, minor, patch)| format!("{op}{major}.{minor}.{patch}"))
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn metric_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0u32..100).prop_map(|n| n.to_string()),
        prop::sample::select(vec!["x".to_string(), "y".to_string(), "z".to_string()]),
    ];
    leaf.prop_recursive(3, 24, 2, |inner| {
        (
            inner.clone(),
            prop::sample::select(vec![
                "+".to_string(),
                "-".to_string(),
                "*".to_string(),
                "/".to_string(),
            ]),
            inner,
        )
            .prop_map(|(lhs, op, rhs)| format!("({lhs} {op} {rhs})"))
    })
}

fn normalize(artifact: &str, kind: ArtifactKind) -> (String, bool) {
    let form = Normalizer::new()
        .normalize(artifact, kind)
        .expect("generated artifacts parse");
    (form.text, form.normalized)
}

proptest! {
    // P1 + P3: normalization is idempotent and terminates within budget
    #[test]
    fn license_normalization_idempotent(expr in license_expr()) {
        let (once, finished) = normalize(&expr, ArtifactKind::LicenseExpr);
        prop_assert!(finished);
        let (twice, _) = normalize(&once, ArtifactKind::LicenseExpr);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn version_normalization_idempotent(range in version_range()) {
        let (once, finished) = normalize(&range, ArtifactKind::VersionRange);
        prop_assert!(finished);
        let (twice, _) = normalize(&once, ArtifactKind::VersionRange);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn metric_normalization_idempotent(expr in metric_expr()) {
        let (once, finished) = normalize(&expr, ArtifactKind::MetricExpr);
        prop_assert!(finished);
        let (twice, _) = normalize(&once, ArtifactKind::MetricExpr);
        prop_assert_eq!(once, twice);
    }

    // P2: semantically equal artifacts share a normal form
    #[test]
    fn license_confluence_under_reordering(atoms in prop::collection::vec(license_leaf(), 2..5)) {
        let forward = atoms.join(" AND ");
        let mut reversed_atoms = atoms.clone();
        reversed_atoms.reverse();
        // Reversal, duplication, and reassociation preserve semantics
        let reversed = format!("({}) AND {}", reversed_atoms.join(" AND "), atoms[0].clone());

        let (lhs, _) = normalize(&forward, ArtifactKind::LicenseExpr);
        let (rhs, _) = normalize(&reversed, ArtifactKind::LicenseExpr);
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn version_confluence_under_reordering(range in version_range()) {
        let mut tokens: Vec<&str> = range.split(' ').collect();
        tokens.reverse();
        let reversed = tokens.join(" ");

        let (lhs, _) = normalize(&range, ArtifactKind::VersionRange);
        let (rhs, _) = normalize(&reversed, ArtifactKind::VersionRange);
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn metric_confluence_under_commutation(
        a in 0u32..50,
        b in 0u32..50,
        symbol in prop::sample::select(vec!["x".to_string(), "y".to_string()]),
    ) {
        let forward = format!("{a} + {symbol} + {b}");
        let shuffled = format!("{b} + {a} + {symbol}");
        let (lhs, _) = normalize(&forward, ArtifactKind::MetricExpr);
        let (rhs, _) = normalize(&shuffled, ArtifactKind::MetricExpr);
        prop_assert_eq!(lhs, rhs);
    }
}

// ---------------------------------------------------------------------------
// Quality engine
// ---------------------------------------------------------------------------

fn risk_vector(values: [f64; 7]) -> RiskVector {
    let mut risks = RiskVector::zero();
    for (index, value) in RiskIndex::ALL.iter().zip(values) {
        risks.set(*index, value);
    }
    risks
}

proptest! {
    // P6: Q is monotone under componentwise risk reduction
    #[test]
    fn q_monotone_under_risk_reduction(
        base in prop::array::uniform7(0.0f64..=1.0),
        cuts in prop::array::uniform7(0.0f64..=1.0),
    ) {
        let engine = QualityEngine::new(Policy::default());
        let reduced: [f64; 7] = std::array::from_fn(|ix| base[ix] * (1.0 - cuts[ix]));

        let q_base = engine.score(&risk_vector(base));
        let q_reduced = engine.score(&risk_vector(reduced));
        prop_assert!(q_reduced >= q_base - 1e-9);
    }

    // P7: every module utility is bounded below by PCQ
    #[test]
    fn pcq_is_a_lower_bound(
        complexities in prop::collection::vec(0.0f64..60.0, 1..6),
    ) {
        let mut files = BTreeMap::new();
        let mut modules = BTreeMap::new();
        for (ix, complexity) in complexities.iter().enumerate() {
            let path = PathBuf::from(format!("m{ix}/file.py"));
            let mut facts = FileFacts::unmeasured(Language::Python);
            facts.cyclomatic_complexity = *complexity;
            facts.loc = 100;
            files.insert(path.clone(), facts);

            let mut module = ModuleFacts::empty(Layer::Business);
            module.members.insert(path);
            module.mean_complexity = *complexity;
            module.total_loc = 100;
            modules.insert(format!("m{ix}"), module);
        }

        let inputs = QualityInputs {
            files: &files,
            modules: &modules,
            issues: &[],
            hotspots: &[],
            ci_present: Some(true),
            test_summary: None,
            layering_violations: 0,
            circular_dependencies: 0,
        };
        let outcome = QualityEngine::new(Policy::default()).evaluate(&inputs);
        for utility in outcome.report.module_utilities.values() {
            prop_assert!(*utility >= outcome.report.pcq - 1e-12);
        }
    }

    // P10: the PCE witness lifts the minimum utility to τ under the bounds
    #[test]
    fn witness_is_feasible(
        utilities in prop::collection::btree_map(
            "[a-f]{1,4}",
            0.3f64..1.0,
            1..5,
        ),
    ) {
        let mut policy = Policy::default();
        policy.k_witness_max = 32;

        let modules: BTreeMap<String, ModuleFacts> = utilities
            .keys()
            .map(|name| {
                let mut facts = ModuleFacts::empty(Layer::Business);
                facts.total_loc = 100;
                (name.clone(), facts)
            })
            .collect();

        let plan = PceGenerator::new(&policy).generate(&utilities, &modules, 50.0, 100.0);

        let mut replay = utilities.clone();
        for task in &plan.tasks {
            prop_assert!(task.delta_u <= policy.delta_u_max + 1e-12);
            prop_assert!(task.estimated_delta_q >= 0.0);
            if let Some(u) = replay.get_mut(&task.module) {
                *u = (*u + task.delta_u).min(1.0);
            }
        }
        let min = replay.values().fold(1.0f64, |acc, u| acc.min(*u));
        prop_assert!(min >= policy.tau - 1e-9);
        prop_assert!(plan.total_delta_q() <= 50.0 + 1e-9);
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

fn sealed_model(q: f64, pcq: f64, risks: RiskVector) -> repoq_rs::ResultModel {
    let report = QualityReport {
        q,
        q_max: 100.0,
        risks,
        pcq,
        module_utilities: BTreeMap::new(),
        critical_issue_count: 0,
        plan: RefactoringPlan::empty(),
    };
    ResultModelBuilder::new("snap", "policy").seal(report)
}

proptest! {
    // P8: a regression on any hard-constrained index rejects, whatever Q does
    #[test]
    fn gate_never_compensates(
        base_risks in prop::array::uniform7(0.0f64..0.9),
        bump in 0.01f64..0.1,
        q_gain in 0.0f64..40.0,
        hard_ix in 0usize..7,
    ) {
        let policy = Policy::default();
        let index = RiskIndex::ALL[hard_ix];
        prop_assume!(policy.hard_constraints.contains(&index));

        let mut head_risks = base_risks;
        head_risks[hard_ix] = (head_risks[hard_ix] + bump).min(1.0);
        prop_assume!(head_risks[hard_ix] > base_risks[hard_ix]);

        let base = sealed_model(50.0, 0.9, risk_vector(base_risks));
        let head = sealed_model(50.0 + q_gain, 0.9, risk_vector(head_risks));

        let verdict = AdmissionGate::new(policy).admit(&base, &head);
        prop_assert!(!verdict.accepted);
    }

    // P9: acceptance implies strict improvement by ε
    #[test]
    fn acceptance_implies_epsilon_improvement(
        q_base in 0.0f64..100.0,
        q_head in 0.0f64..100.0,
        pcq in 0.0f64..=1.0,
    ) {
        let policy = Policy::default();
        let epsilon = policy.epsilon;
        let base = sealed_model(q_base, 0.9, RiskVector::zero());
        let head = sealed_model(q_head, pcq, RiskVector::zero());

        let verdict = AdmissionGate::new(policy).admit(&base, &head);
        if verdict.accepted {
            prop_assert!(q_head >= q_base + epsilon - 1e-9);
            prop_assert!(pcq >= 0.8 - 1e-9);
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler and graphs
// ---------------------------------------------------------------------------

proptest! {
    // P5: no analyzer is scheduled before its enabled dependencies
    #[test]
    fn scheduler_orders_dependencies(subset in prop::collection::btree_set(0usize..8, 1..8)) {
        let enabled: BTreeSet<AnalyzerKind> =
            subset.iter().map(|ix| AnalyzerKind::ALL[*ix]).collect();

        let mut registry = AnalyzerRegistry::new();
        register_default_analyzers(&mut registry, Arc::new(LexicalMeasurementProvider::new()));
        let plan = registry.plan(&enabled).expect("family metadata is acyclic");

        let mut completed: BTreeSet<AnalyzerKind> = BTreeSet::new();
        for stage in &plan.stages {
            for kind in stage {
                let info = registry.get(*kind).expect("registered").info();
                for dep in &info.dependencies {
                    if enabled.contains(dep) {
                        prop_assert!(
                            completed.contains(dep),
                            "{kind} scheduled before {dep}"
                        );
                    }
                }
            }
            completed.extend(stage.iter().copied());
        }
    }

    // P12: removing reported cycle components yields an acyclic graph
    #[test]
    fn cycle_removal_yields_dag(
        edges in prop::collection::btree_set((0u8..6, 0u8..6), 0..20),
    ) {
        let mut graph = DependencyGraph::new();
        for (from, to) in &edges {
            graph.add_edge(format!("f{from}.py"), format!("f{to}.py"));
        }
        let cycles = graph.cycles();
        prop_assert!(graph.without_cycle_edges(&cycles).is_acyclic());
    }
}
