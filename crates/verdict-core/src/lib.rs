//! verdict-core: a policy decision engine over an SMT solver
//!
//! Compiles declarative policy documents into constraint problems with
//! tracked, named assertions, verifies per-request facts against them, and
//! returns decisions carrying machine-checkable proofs: a satisfying model,
//! or an unsatisfiable core citing the invariants that forbade the request.
//!
//! Pipeline: a [`document::PolicyDocument`] is shape-validated, compiled once
//! into an immutable [`compiler::CompiledPolicy`], and shared across
//! requests. Each request runs one solver check through a
//! [`verifier::Verifier`]; the [`router::DecisionRouter`] composes checks with
//! the injected [`adapters`] into a final decision record.

pub mod adapters;
pub mod ast;
pub mod compiler;
pub mod config;
pub mod document;
pub mod facts;
pub mod parser;
pub mod router;
pub mod smt;
pub mod store;
pub mod verifier;

// Test fixtures (available in tests and behind the `testing` feature)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::{AdapterError, Explainer, Proposal, Proposer, Repair};
pub use compiler::{compile, CompiledPolicy, SpecError};
pub use config::EngineConfig;
pub use document::{validate_document, PolicyDocument};
pub use facts::{Facts, Scalar};
pub use router::{DecisionRecord, DecisionRouter, Mode, Proof, DECLINE};
pub use store::PolicyStore;
pub use verifier::{Verifier, VerifyResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("policy compilation failed: {0}")]
    Spec(#[from] compiler::SpecError),

    #[error(transparent)]
    Binding(smt::BindingError),

    #[error("solver failure: {0}")]
    Solver(String),

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<smt::CheckError> for Error {
    fn from(err: smt::CheckError) -> Self {
        match err {
            smt::CheckError::Binding(binding) => Error::Binding(binding),
            smt::CheckError::Internal(message) => Error::Solver(message.to_string()),
        }
    }
}

impl From<smt::BindingError> for Error {
    fn from(err: smt::BindingError) -> Self {
        Error::Binding(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
