//! External adapter contracts and reference implementations
//!
//! The router consumes three injected capabilities: a proposer picks a
//! candidate action, a repair turns a failed verification into a new
//! candidate, and an explainer renders the user-visible explanation. All
//! three are pure; the reference implementations below are deterministic
//! threshold heuristics for the card-authorization demo domain and double as
//! test stubs for the engine mechanism.

use crate::facts::Facts;
use crate::router::Proof;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An adapter failed; the router declines and names the adapter
#[derive(Error, Debug, Clone, PartialEq)]
#[error("adapter `{adapter}` failed: {message}")]
pub struct AdapterError {
    pub adapter: &'static str,
    pub message: String,
}

impl AdapterError {
    /// Create a new adapter error
    pub fn new(adapter: &'static str, message: impl Into<String>) -> Self {
        Self { adapter, message: message.into() }
    }
}

/// A proposed action with its justification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposed_action: String,
    pub justification: String,
    #[serde(default)]
    pub requested_additional_data: Vec<String>,
}

impl Proposal {
    /// Create a proposal with no additional-data request
    pub fn new(action: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            proposed_action: action.into(),
            justification: justification.into(),
            requested_additional_data: Vec::new(),
        }
    }
}

/// Picks a candidate action for soft mode. Pure and deterministic; must
/// return one of the policy's declared action names.
pub trait Proposer {
    fn propose(&self, facts: &Facts) -> Result<Proposal, AdapterError>;
}

/// Turns a failed verification into a new candidate. Must return an action
/// from `allowed_actions`.
pub trait Repair {
    fn repair(
        &self,
        previous: &Proposal,
        unsat_core: &[String],
        facts: &Facts,
        allowed_actions: &[String],
    ) -> Result<Proposal, AdapterError>;
}

/// Renders the user-visible explanation. On an unsatisfiable proof the
/// explanation must cite at least one name from `proof.unsat_core`.
pub trait Explainer {
    fn explain(
        &self,
        action: &str,
        facts: &Facts,
        proof: &Proof,
        justification: Option<&str>,
    ) -> String;
}

/// Risk ceiling under which frictionless approval is proposed
const RISK_CEILING_NO_OTP: f64 = 0.35;
/// Risk ceiling under which step-up approval is proposed
const RISK_CEILING_OTP: f64 = 0.55;

/// Deterministic threshold proposer for the authorization demo domain:
/// frictionless approval on low risk within available balance, step-up
/// approval on borderline risk within the credit limit, decline otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdProposer;

impl Proposer for ThresholdProposer {
    fn propose(&self, facts: &Facts) -> Result<Proposal, AdapterError> {
        let risk = facts.get("risk").and_then(|v| v.as_f64());
        let amount = facts.get("amount").and_then(|v| v.as_f64());
        let avail = facts.get("avail").and_then(|v| v.as_f64());
        let limit = facts.get("limit").and_then(|v| v.as_f64());

        if let (Some(risk), Some(amount)) = (risk, amount) {
            if let Some(avail) = avail {
                if risk <= RISK_CEILING_NO_OTP && amount <= avail {
                    return Ok(Proposal::new(
                        "approve_no_otp",
                        "Low risk and within available balance.",
                    ));
                }
            }
            if let Some(limit) = limit {
                if risk <= RISK_CEILING_OTP && amount <= limit {
                    return Ok(Proposal::new(
                        "approve_with_otp",
                        "Borderline risk; within limit; step-up auth.",
                    ));
                }
            }
        }

        Ok(Proposal::new("decline", "High risk or exceeds limits."))
    }
}

/// Deterministic repair guided by the unsat core: a violated card-not-present
/// tightening is unrepairable, otherwise step up to OTP approval when the
/// facts stay within the credit limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreGuidedRepair;

impl Repair for CoreGuidedRepair {
    fn repair(
        &self,
        _previous: &Proposal,
        unsat_core: &[String],
        facts: &Facts,
        allowed_actions: &[String],
    ) -> Result<Proposal, AdapterError> {
        let allowed = |action: &str| allowed_actions.iter().any(|a| a == action);

        if unsat_core.iter().any(|name| name == "cnp_tightened") {
            return Ok(Proposal::new(
                "decline",
                "Card-not-present with risk above policy threshold.",
            ));
        }

        let risk = facts.get("risk").and_then(|v| v.as_f64());
        let amount = facts.get("amount").and_then(|v| v.as_f64());
        let limit = facts.get("limit").and_then(|v| v.as_f64());
        if let (Some(risk), Some(amount), Some(limit)) = (risk, amount, limit) {
            if risk <= RISK_CEILING_OTP && amount <= limit && allowed("approve_with_otp") {
                return Ok(Proposal::new(
                    "approve_with_otp",
                    "Within limit; risk acceptable for step-up.",
                ));
            }
        }

        // "decline" is the engine's fallback decision, always a valid give-up
        Ok(Proposal::new("decline", "Constraints unsatisfied after repair."))
    }
}

/// A proposer that always returns the same action; the simplest useful stub
#[derive(Debug, Clone)]
pub struct FixedProposer {
    proposal: Proposal,
}

impl FixedProposer {
    /// Propose `action` unconditionally
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            proposal: Proposal::new(action, "Fixed proposal."),
        }
    }
}

impl Proposer for FixedProposer {
    fn propose(&self, _facts: &Facts) -> Result<Proposal, AdapterError> {
        Ok(self.proposal.clone())
    }
}

/// Template explainer: cites the unsat core on a decline, passes the
/// adapter's justification through on an approval.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExplainer;

impl Explainer for TemplateExplainer {
    fn explain(
        &self,
        action: &str,
        _facts: &Facts,
        proof: &Proof,
        justification: Option<&str>,
    ) -> String {
        if proof.satisfiable {
            if action == "decline" {
                return "Declined.".to_string();
            }
            return match justification {
                Some(justification) => justification.to_string(),
                None => format!("Approved: `{}` satisfies all checked invariants.", action),
            };
        }

        if proof.unsat_core.is_empty() {
            return "Declined: constraints could not be verified.".to_string();
        }

        let cited: Vec<String> =
            proof.unsat_core.iter().map(|name| format!("`{}`", name)).collect();
        format!("Declined: violated {}.", cited.join("; "))
    }
}
