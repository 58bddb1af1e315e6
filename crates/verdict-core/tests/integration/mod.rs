//! Integration tests for the policy decision engine
//!
//! All scenarios run against the `auth_v1` demo policy shipped under
//! `policies/`.

mod e2e_tests;
mod property_tests;

use std::sync::Arc;
use verdict_core::adapters::{CoreGuidedRepair, TemplateExplainer, ThresholdProposer};
use verdict_core::{compile, DecisionRouter, Facts, PolicyDocument, Verifier};

pub fn auth_document() -> PolicyDocument {
    PolicyDocument::from_json_str(include_str!("../../policies/auth_v1.json"))
        .expect("auth_v1 policy must parse")
}

pub fn auth_verifier() -> Verifier {
    Verifier::new(Arc::new(compile(&auth_document()).expect("auth_v1 policy must compile")))
}

pub fn auth_router() -> DecisionRouter<ThresholdProposer, CoreGuidedRepair, TemplateExplainer> {
    DecisionRouter::new(auth_verifier(), ThresholdProposer, CoreGuidedRepair, TemplateExplainer)
}

pub fn auth_facts(amount: f64, avail: f64, limit: f64, risk: f64, vel1h: i64, cnp: bool) -> Facts {
    Facts::new()
        .with("amount", amount)
        .with("avail", avail)
        .with("limit", limit)
        .with("risk", risk)
        .with("vel1h", vel1h)
        .with("cnp", cnp)
}
