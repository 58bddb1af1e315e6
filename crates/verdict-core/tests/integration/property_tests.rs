//! Universal engine properties over the `auth_v1` policy

use crate::{auth_document, auth_facts, auth_router, auth_verifier};
use serde_json::json;
use std::sync::Arc;
use verdict_core::smt::FORCED_ACTION;
use verdict_core::{compile, Mode, PolicyDocument, Scalar, Verifier};

/// Compiling the same document twice yields factories that produce identical
/// decision records on identical inputs.
#[test]
fn compilation_is_pure() {
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false);

    let first = auth_router().decide(&facts, Mode::Hard).unwrap();
    let second = auth_router().decide(&facts, Mode::Hard).unwrap();

    assert_eq!(first, second);
}

/// Facts whose names are not declared variables do not change the record.
#[test]
fn irrelevant_facts_are_independent() {
    let router = auth_router();
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false);
    let noisy = facts.clone().with("channel", "web").with("ghost_metric", 42_i64);

    let baseline = router.decide(&facts, Mode::Hard).unwrap();
    let with_noise = router.decide(&noisy, Mode::Hard).unwrap();

    assert_eq!(baseline, with_noise);
}

/// Binding a fact is equivalent to adding the equality as an invariant.
#[test]
fn fact_binding_is_equational() {
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false);

    let bound = auth_router().decide(&facts, Mode::Hard).unwrap();

    // Same policy, but `amount` pinned by an invariant instead of a fact.
    let mut doc = serde_json::to_value(auth_document()).unwrap();
    doc["invariants"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "amount_pinned", "assert": "amount == 100.0" }));
    let pinned_policy = compile(&PolicyDocument::from_value(doc).unwrap()).unwrap();

    // Same request, but without the amount fact: the invariant supplies it.
    let pinned_facts = verdict_core::Facts::new()
        .with("avail", 1000.0)
        .with("limit", 5000.0)
        .with("risk", 0.10)
        .with("vel1h", 1_i64)
        .with("cnp", false);

    let pinned = Verifier::new(Arc::new(pinned_policy)).check(&pinned_facts, None).unwrap();

    assert!(bound.proof.satisfiable);
    assert!(pinned.satisfiable);
    assert_eq!(bound.decision, pinned.chosen_action.unwrap());
    assert_eq!(bound.proof.model, pinned.model);
}

/// If a forced action verifies, the solver admits it as a valid choice.
#[test]
fn forced_action_soundness() {
    let verifier = auth_verifier();
    let facts = auth_facts(500.0, 450.0, 1000.0, 0.40, 2, true);

    let forced = verifier.check(&facts, Some("approve_with_otp")).unwrap();
    assert!(forced.satisfiable);

    let free = verifier.check(&facts, None).unwrap();
    assert!(free.satisfiable);
    assert_eq!(free.chosen_action.as_deref(), Some("approve_with_otp"));
}

/// Every name in a returned core is a declared invariant name or the
/// forced-action assertion name.
#[test]
fn unsat_core_containment() {
    let verifier = auth_verifier();
    let invariants = verifier.policy().invariant_names();

    let cases = [
        (auth_facts(10000.0, 1000.0, 5000.0, 0.20, 1, false), None),
        (auth_facts(200.0, 1000.0, 5000.0, 0.70, 1, true), None),
        (auth_facts(500.0, 450.0, 1000.0, 0.40, 2, true), Some("approve_no_otp")),
        (auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false), Some("not_an_action")),
    ];

    for (facts, forced) in cases {
        let result = verifier.check(&facts, forced).unwrap();
        assert!(!result.satisfiable);
        assert!(!result.unsat_core.is_empty());
        for name in &result.unsat_core {
            assert!(
                invariants.contains(name) || name == FORCED_ACTION,
                "unexpected core name: {}",
                name
            );
        }
    }
}

/// With one-hot actions, a satisfiable model sets exactly one action flag.
#[test]
fn one_hot_law() {
    let verifier = auth_verifier();
    let actions = verifier.policy().action_names();

    let cases = [
        auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false),
        auth_facts(500.0, 450.0, 1000.0, 0.40, 2, true),
    ];

    for facts in cases {
        let result = verifier.check(&facts, None).unwrap();
        assert!(result.satisfiable);
        let set = actions
            .iter()
            .filter(|name| result.model.get(*name) == Some(&Scalar::Bool(true)))
            .count();
        assert_eq!(set, 1);
    }
}

/// When the proposer matches the solver's own choice, soft mode agrees with
/// hard mode without a repair round.
#[test]
fn hard_soft_agreement_under_matching_proposal() {
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false);

    let hard = auth_router().decide(&facts, Mode::Hard).unwrap();
    let soft = auth_router().decide(&facts, Mode::Soft).unwrap();

    assert_eq!(hard.decision, soft.decision);
    assert!(soft.proof.satisfiable);
}

/// An unbound variable stays free: the solver may choose any value that
/// satisfies the invariants.
#[test]
fn unbound_variables_stay_free() {
    let verifier = auth_verifier();
    // No velocity fact; the solver must still find vel1h <= 5.
    let facts = verdict_core::Facts::new()
        .with("amount", 100.0)
        .with("avail", 1000.0)
        .with("limit", 5000.0)
        .with("risk", 0.10)
        .with("cnp", false);

    let result = verifier.check(&facts, None).unwrap();
    assert!(result.satisfiable);
    match result.model.get("vel1h") {
        Some(Scalar::Int(v)) => assert!(*v <= 5),
        other => panic!("expected an integer velocity, got {:?}", other),
    }
}

/// Type-incompatible facts fail the request with a binding error.
#[test]
fn incompatible_fact_is_a_binding_error() {
    let verifier = auth_verifier();
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false).with("cnp", 1_i64);

    let err = verifier.check(&facts, None).unwrap_err();
    assert!(matches!(err, verdict_core::Error::Binding(_)));
}
