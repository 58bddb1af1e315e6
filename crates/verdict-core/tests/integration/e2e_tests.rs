//! End-to-end decision scenarios against the `auth_v1` policy

use crate::{auth_facts, auth_router, auth_verifier};
use std::sync::atomic::{AtomicUsize, Ordering};
use verdict_core::adapters::{
    AdapterError, CoreGuidedRepair, FixedProposer, Proposal, Repair, TemplateExplainer,
};
use verdict_core::{DecisionRouter, Facts, Mode, Scalar};

/// Counts repair invocations while delegating to the reference repair
#[derive(Default)]
struct CountingRepair {
    calls: AtomicUsize,
}

impl Repair for &CountingRepair {
    fn repair(
        &self,
        previous: &Proposal,
        unsat_core: &[String],
        facts: &Facts,
        allowed_actions: &[String],
    ) -> Result<Proposal, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CoreGuidedRepair.repair(previous, unsat_core, facts, allowed_actions)
    }
}

#[test]
fn s1_low_risk_hard_approves_without_otp() {
    let router = auth_router();
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false);

    let record = router.decide(&facts, Mode::Hard).unwrap();
    assert_eq!(record.decision, "approve_no_otp");
    assert!(record.proof.satisfiable);
    assert_eq!(record.proof.model.get("approve_no_otp"), Some(&Scalar::Bool(true)));
    assert_eq!(record.policy_version, "auth_v1");
}

#[test]
fn s2_borderline_soft_approves_with_otp_in_one_check() {
    let repair = CountingRepair::default();
    let router = DecisionRouter::new(
        auth_verifier(),
        verdict_core::adapters::ThresholdProposer,
        &repair,
        TemplateExplainer,
    );
    let facts = auth_facts(500.0, 450.0, 1000.0, 0.40, 2, true);

    let record = router.decide(&facts, Mode::Soft).unwrap();
    assert_eq!(record.decision, "approve_with_otp");
    assert!(record.proof.satisfiable);
    // First verification succeeded; repair never ran.
    assert_eq!(repair.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn s3_cnp_high_risk_declines_with_cited_core() {
    let router = auth_router();
    let facts = auth_facts(200.0, 1000.0, 5000.0, 0.70, 1, true);

    let record = router.decide(&facts, Mode::Hard).unwrap();
    assert_eq!(record.decision, "decline");
    assert!(!record.proof.satisfiable);
    assert!(record.proof.unsat_core.contains(&"cnp_tightened".to_string()));
    assert!(record.explanation.contains("cnp_tightened"));
}

#[test]
fn s4_amount_over_all_ceilings_declines() {
    let router = auth_router();
    let facts = auth_facts(10000.0, 1000.0, 5000.0, 0.20, 1, false);

    let record = router.decide(&facts, Mode::Hard).unwrap();
    assert_eq!(record.decision, "decline");
    assert!(!record.proof.satisfiable);
    assert!(record
        .proof
        .unsat_core
        .iter()
        .any(|name| name.starts_with("within_limit_") || name.starts_with("within_avail_")));
}

#[test]
fn s5_velocity_burst_declines() {
    let router = auth_router();
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.20, 99, false);

    let record = router.decide(&facts, Mode::Hard).unwrap();
    assert_eq!(record.decision, "decline");
    assert!(record.proof.unsat_core.contains(&"velocity_cap".to_string()));
}

#[test]
fn s6_bad_proposal_is_repaired_once() {
    let repair = CountingRepair::default();
    let router = DecisionRouter::new(
        auth_verifier(),
        FixedProposer::new("approve_no_otp"),
        &repair,
        TemplateExplainer,
    );
    // Same facts as S2; the forced frictionless approval cannot verify.
    let facts = auth_facts(500.0, 450.0, 1000.0, 0.40, 2, true);

    let record = router.decide(&facts, Mode::Soft).unwrap();
    assert_eq!(record.decision, "approve_with_otp");
    assert!(record.proof.satisfiable);
    assert_eq!(repair.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn soft_mode_declines_when_nothing_verifies() {
    let repair = CountingRepair::default();
    let router = DecisionRouter::new(
        auth_verifier(),
        FixedProposer::new("approve_no_otp"),
        &repair,
        TemplateExplainer,
    );
    let facts = auth_facts(10000.0, 1000.0, 5000.0, 0.20, 1, false);

    let record = router.decide(&facts, Mode::Soft).unwrap();
    assert_eq!(record.decision, "decline");
    assert!(!record.proof.satisfiable);
    assert_eq!(repair.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn nested_request_flattens_to_the_same_decision() {
    let router = auth_router();

    let nested = serde_json::json!({
        "amount": 200.0,
        "account": { "available": 1000.0, "credit_limit": 5000.0 },
        "risk": { "score": 0.70, "velocity_1h": 1 },
        "context": { "mcc": 5999, "is_card_present": false }
    });

    // The flattener is domain code; reproduce its mapping inline.
    let facts = Facts::new()
        .with("amount", 200.0)
        .with("avail", nested["account"]["available"].as_f64().unwrap())
        .with("limit", nested["account"]["credit_limit"].as_f64().unwrap())
        .with("risk", nested["risk"]["score"].as_f64().unwrap())
        .with("vel1h", nested["risk"]["velocity_1h"].as_i64().unwrap())
        .with("cnp", !nested["context"]["is_card_present"].as_bool().unwrap());

    let record = router.decide(&facts, Mode::Hard).unwrap();
    assert_eq!(record.decision, "decline");
    assert!(record.proof.unsat_core.contains(&"cnp_tightened".to_string()));
}

#[test]
fn decision_record_wire_format() {
    let router = auth_router();
    let facts = auth_facts(100.0, 1000.0, 5000.0, 0.10, 1, false);

    let json = serde_json::to_value(router.decide(&facts, Mode::Hard).unwrap()).unwrap();

    assert!(json["decision"].is_string());
    assert!(json["policy_version"].is_string());
    assert!(json["explanation"].is_string());
    assert_eq!(json["proof"]["solver"], "z3");
    assert!(json["proof"]["satisfiable"].is_boolean());
    assert!(json["proof"]["model"].is_object());
    assert!(json["proof"]["checked_invariants"].is_array());
    assert!(json["proof"]["unsat_core"].is_array());
}
