//! Test fixtures for the card-authorization demo domain
//!
//! Shared by unit tests across modules; enable the `testing` feature to use
//! them from dependent crates.

use crate::compiler::{compile, CompiledPolicy};
use crate::document::PolicyDocument;
use crate::facts::{Facts, Scalar};
use serde_json::Value;

/// The `auth_v1` demo policy document, as shipped under `policies/`
pub fn auth_policy_json() -> &'static str {
    include_str!("../policies/auth_v1.json")
}

/// Parsed `auth_v1` document
pub fn auth_policy_document() -> PolicyDocument {
    PolicyDocument::from_json_str(auth_policy_json()).expect("auth_v1 fixture must parse")
}

/// Compiled `auth_v1` policy
pub fn auth_policy() -> CompiledPolicy {
    compile(&auth_policy_document()).expect("auth_v1 fixture must compile")
}

/// Facts for one authorization request against `auth_v1`
pub fn auth_facts(
    amount: f64,
    avail: f64,
    limit: f64,
    risk: f64,
    vel1h: i64,
    cnp: bool,
) -> Facts {
    Facts::new()
        .with("amount", amount)
        .with("avail", avail)
        .with("limit", limit)
        .with("risk", risk)
        .with("vel1h", vel1h)
        .with("cnp", cnp)
}

/// Flatten the nested authorization request shape onto the `auth_v1`
/// variable namespace. Domain code, not part of the engine contract:
///
/// - `account.available` -> `avail`
/// - `account.credit_limit` -> `limit`
/// - `risk.score` -> `risk`
/// - `risk.velocity_1h` -> `vel1h`
/// - `context.is_card_present` -> `cnp` (negated)
///
/// Pre-flattened top-level fields pass through untouched.
pub fn flatten_auth_request(nested: &Value) -> Facts {
    let mut facts = Facts::new();

    for key in ["amount", "avail", "limit", "risk", "vel1h", "cnp"] {
        if let Some(value) = nested.get(key) {
            if let Some(scalar) = scalar_of(value) {
                facts.insert(key, scalar);
            }
        }
    }

    let account = nested.get("account");
    if let Some(value) = account.and_then(|a| a.get("available")).and_then(scalar_of) {
        if facts.get("avail").is_none() {
            facts.insert("avail", value);
        }
    }
    if let Some(value) = account.and_then(|a| a.get("credit_limit")).and_then(scalar_of) {
        if facts.get("limit").is_none() {
            facts.insert("limit", value);
        }
    }

    let risk = nested.get("risk");
    if let Some(value) = risk.and_then(|r| r.get("score")).and_then(scalar_of) {
        if facts.get("risk").is_none() {
            facts.insert("risk", value);
        }
    }
    if let Some(value) = risk.and_then(|r| r.get("velocity_1h")).and_then(scalar_of) {
        if facts.get("vel1h").is_none() {
            facts.insert("vel1h", value);
        }
    }

    if let Some(present) = nested
        .get("context")
        .and_then(|c| c.get("is_card_present"))
        .and_then(Value::as_bool)
    {
        if facts.get("cnp").is_none() {
            facts.insert("cnp", !present);
        }
    }

    facts
}

fn scalar_of(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Int(i))
            } else {
                n.as_f64().map(Scalar::Float)
            }
        },
        Value::String(s) => Some(Scalar::Str(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_fixture_compiles() {
        let compiled = auth_policy();
        assert_eq!(compiled.id(), "auth_v1");
        assert_eq!(
            compiled.invariant_names(),
            vec![
                "cnp_tightened",
                "velocity_cap",
                "within_limit_if_otp",
                "within_avail_if_no_otp",
                "low_risk_if_no_otp",
            ]
        );
        assert_eq!(compiled.action_names(), vec!["approve_no_otp", "approve_with_otp"]);
        assert!(compiled.one_hot_actions());
    }

    #[test]
    fn test_flatten_nested_request() {
        let facts = flatten_auth_request(&json!({
            "amount": 500.0,
            "account": { "available": 450.0, "credit_limit": 1000.0 },
            "risk": { "score": 0.62, "velocity_1h": 2 },
            "context": { "mcc": 5999, "is_card_present": false }
        }));

        assert_eq!(facts.get("amount"), Some(&Scalar::Float(500.0)));
        assert_eq!(facts.get("avail"), Some(&Scalar::Float(450.0)));
        assert_eq!(facts.get("limit"), Some(&Scalar::Float(1000.0)));
        assert_eq!(facts.get("risk"), Some(&Scalar::Float(0.62)));
        assert_eq!(facts.get("vel1h"), Some(&Scalar::Int(2)));
        assert_eq!(facts.get("cnp"), Some(&Scalar::Bool(true)));
    }

    #[test]
    fn test_flatten_passes_flat_fields_through() {
        let facts = flatten_auth_request(&json!({
            "amount": 100.0,
            "avail": 900.0,
            "risk": 0.1,
            "cnp": false
        }));

        assert_eq!(facts.get("amount"), Some(&Scalar::Float(100.0)));
        assert_eq!(facts.get("avail"), Some(&Scalar::Float(900.0)));
        assert_eq!(facts.get("risk"), Some(&Scalar::Float(0.1)));
        assert_eq!(facts.get("cnp"), Some(&Scalar::Bool(false)));
    }

    #[test]
    fn test_flatten_prefers_explicit_flat_fields() {
        let facts = flatten_auth_request(&json!({
            "avail": 100.0,
            "account": { "available": 450.0 }
        }));

        assert_eq!(facts.get("avail"), Some(&Scalar::Float(100.0)));
    }
}
