//! Verifier: drive the solver and interpret its verdict
//!
//! The verifier owns the safety posture around the raw solver result: `sat`
//! yields a model and a chosen action, `unsat` yields a named core, and
//! `unknown` (including deadline expiry) is folded into "not satisfiable"
//! with an empty core rather than being allowed to approve anything.

use crate::compiler::CompiledPolicy;
use crate::facts::{Facts, Scalar};
use crate::smt::{CheckOutcome, SolverVerdict};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Structured verdict for one verification call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResult {
    pub satisfiable: bool,
    pub chosen_action: Option<String>,
    pub model: BTreeMap<String, Scalar>,
    pub checked_invariants: Vec<String>,
    pub unsat_core: Vec<String>,
}

/// Drives per-request checks against one compiled policy
#[derive(Debug, Clone)]
pub struct Verifier {
    policy: Arc<CompiledPolicy>,
    deadline: Option<Duration>,
}

impl Verifier {
    /// Create a verifier over a shared compiled policy
    pub fn new(policy: Arc<CompiledPolicy>) -> Self {
        Self { policy, deadline: None }
    }

    /// Set a solver deadline; expiry is treated as unsatisfiable
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The compiled policy this verifier runs against
    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    /// Run one check for `facts`, optionally forcing an action
    pub fn check(&self, facts: &Facts, forced_action: Option<&str>) -> crate::Result<VerifyResult> {
        let outcome = self.policy.check_with(facts, forced_action, self.deadline)?;
        let checked_invariants = self.policy.invariant_names();

        let CheckOutcome { verdict, chosen_action, model, unsat_core } = outcome;

        match verdict {
            SolverVerdict::Sat => Ok(VerifyResult {
                satisfiable: true,
                chosen_action,
                model,
                checked_invariants,
                unsat_core: Vec::new(),
            }),
            SolverVerdict::Unsat => Ok(VerifyResult {
                satisfiable: false,
                chosen_action: None,
                model: BTreeMap::new(),
                checked_invariants,
                unsat_core,
            }),
            SolverVerdict::Unknown => {
                warn!(
                    policy = self.policy.id(),
                    "solver returned unknown; treating as unsatisfiable"
                );
                Ok(VerifyResult {
                    satisfiable: false,
                    chosen_action: None,
                    model: BTreeMap::new(),
                    checked_invariants,
                    unsat_core: Vec::new(),
                })
            },
        }
    }
}
