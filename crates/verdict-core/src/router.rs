//! Decision router
//!
//! Coordinates the two decision modes over one verifier and the injected
//! adapters. Hard mode lets the solver choose the action; soft mode verifies
//! an externally proposed action and allows exactly one repair round before
//! declining. Every path returns a well-formed decision record.

use crate::adapters::{Explainer, Proposer, Repair};
use crate::facts::{Facts, Scalar};
use crate::verifier::{Verifier, VerifyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Fallback decision when no action can be chosen or verified
pub const DECLINE: &str = "decline";

/// Decision mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Solver-chosen action
    Hard,
    /// Externally proposed action, verified, with one repair round
    Soft,
}

/// Machine-checkable proof attached to a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proof {
    pub solver: String,
    pub satisfiable: bool,
    pub model: BTreeMap<String, Scalar>,
    pub checked_invariants: Vec<String>,
    pub unsat_core: Vec<String>,
}

/// The user-visible decision record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub decision: String,
    pub policy_version: String,
    pub proof: Proof,
    pub explanation: String,
}

/// Routes decision requests through the verifier and adapters
#[derive(Debug, Clone)]
pub struct DecisionRouter<P, R, E> {
    verifier: Verifier,
    proposer: P,
    repair: R,
    explainer: E,
    solver_name: String,
}

impl<P, R, E> DecisionRouter<P, R, E>
where
    P: Proposer,
    R: Repair,
    E: Explainer,
{
    /// Create a router over a verifier and adapter set
    pub fn new(verifier: Verifier, proposer: P, repair: R, explainer: E) -> Self {
        Self {
            verifier,
            proposer,
            repair,
            explainer,
            solver_name: "z3".to_string(),
        }
    }

    /// Override the solver name stamped into proofs
    pub fn with_solver_name(mut self, name: impl Into<String>) -> Self {
        self.solver_name = name.into();
        self
    }

    /// Decide a request
    pub fn decide(&self, facts: &Facts, mode: Mode) -> crate::Result<DecisionRecord> {
        match mode {
            Mode::Hard => self.decide_hard(facts),
            Mode::Soft => self.decide_soft(facts),
        }
    }

    fn decide_hard(&self, facts: &Facts) -> crate::Result<DecisionRecord> {
        let result = self.verifier.check(facts, None)?;
        let decision = result
            .chosen_action
            .clone()
            .unwrap_or_else(|| DECLINE.to_string());
        let proof = self.pack(result);
        let explanation = self.explainer.explain(&decision, facts, &proof, None);
        Ok(self.record(decision, proof, explanation))
    }

    fn decide_soft(&self, facts: &Facts) -> crate::Result<DecisionRecord> {
        let proposal = match self.proposer.propose(facts) {
            Ok(proposal) => proposal,
            Err(err) => {
                warn!(error = %err, "proposer failed; declining");
                return Ok(self.adapter_failure_record(None));
            },
        };

        let result = self.verifier.check(facts, Some(&proposal.proposed_action))?;
        if result.satisfiable {
            let proof = self.pack(result);
            let explanation = self.explainer.explain(
                &proposal.proposed_action,
                facts,
                &proof,
                Some(&proposal.justification),
            );
            return Ok(self.record(proposal.proposed_action, proof, explanation));
        }

        // One repair round, never more.
        let repaired = match self.repair.repair(
            &proposal,
            &result.unsat_core,
            facts,
            &self.verifier.policy().action_names(),
        ) {
            Ok(repaired) => repaired,
            Err(err) => {
                warn!(error = %err, "repair failed; declining");
                return Ok(self.adapter_failure_record(Some(result)));
            },
        };

        let result = self.verifier.check(facts, Some(&repaired.proposed_action))?;
        let decision = if result.satisfiable {
            repaired.proposed_action.clone()
        } else {
            DECLINE.to_string()
        };
        let proof = self.pack(result);
        let explanation =
            self.explainer
                .explain(&decision, facts, &proof, Some(&repaired.justification));
        Ok(self.record(decision, proof, explanation))
    }

    fn pack(&self, result: VerifyResult) -> Proof {
        Proof {
            solver: self.solver_name.clone(),
            satisfiable: result.satisfiable,
            model: result.model,
            checked_invariants: result.checked_invariants,
            unsat_core: result.unsat_core,
        }
    }

    fn record(&self, decision: String, proof: Proof, explanation: String) -> DecisionRecord {
        DecisionRecord {
            decision,
            policy_version: self.verifier.policy().id().to_string(),
            proof,
            explanation,
        }
    }

    /// Decline after an adapter failure. The last verification result is
    /// reused when one exists; otherwise the proof carries no model and no
    /// core, only the invariant list that would have been checked.
    fn adapter_failure_record(&self, last_result: Option<VerifyResult>) -> DecisionRecord {
        let (adapter, proof) = match last_result {
            Some(result) => ("repair", self.pack(result)),
            None => (
                "proposer",
                Proof {
                    solver: self.solver_name.clone(),
                    satisfiable: false,
                    model: BTreeMap::new(),
                    checked_invariants: self.verifier.policy().invariant_names(),
                    unsat_core: Vec::new(),
                },
            ),
        };
        let explanation = format!("Declined: adapter `{}` failed.", adapter);
        self.record(DECLINE.to_string(), proof, explanation)
    }
}
