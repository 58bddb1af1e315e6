//! Policy compiler
//!
//! Binds a validated policy document into an immutable [`CompiledPolicy`]:
//! every invariant assertion and action guard is parsed and type-checked
//! against the declared environment, so per-request solving can never hit an
//! unresolved identifier or an ill-typed expression. A compiled policy is
//! cheap to share (`Arc`) and safe to use from concurrent requests.

use crate::ast::nodes::Expr;
use crate::ast::types::{infer, TypeEnv, TypeError, VarType};
use crate::document::{DocumentError, PolicyDocument};
use crate::facts::Scalar;
use crate::parser::{parse_expression, ParseError};
use crate::smt::FORCED_ACTION;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Compile-time failure: document validation or expression compilation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("in `{name}`: {source}")]
    Parse { name: String, source: ParseError },

    #[error("in `{name}`: {source}")]
    Type { name: String, source: TypeError },

    #[error("`{name}` must yield a boolean, got {got}")]
    NotBoolean { name: String, got: VarType },

    #[error("duplicate or reserved name: {0}")]
    DuplicateName(String),

    #[error("duplicate invariant name: {0}")]
    DuplicateInvariant(String),

    #[error("empty identifier in {0}")]
    EmptyIdentifier(&'static str),

    #[error("constant `{0}` must be a boolean or a finite number")]
    UnsupportedConstant(String),
}

pub type CompileResult<T> = Result<T, SpecError>;

/// A parsed invariant, tracked under its policy-declared name
#[derive(Debug, Clone)]
pub struct TrackedAssertion {
    pub name: String,
    pub expr: Expr,
}

/// A parsed action guard
#[derive(Debug, Clone)]
pub struct ActionGuard {
    pub name: String,
    pub guard: Expr,
}

/// An immutable compiled policy: the per-request solver-context factory
///
/// Variables and action flags keep their declaration order; `chosen_action`
/// tie-breaking and model listing follow it.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    id: String,
    vars: Vec<(String, VarType)>,
    var_types: HashMap<String, VarType>,
    constants: BTreeMap<String, Scalar>,
    invariants: Vec<TrackedAssertion>,
    actions: Vec<ActionGuard>,
    one_hot_actions: bool,
}

impl CompiledPolicy {
    /// Policy version identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared variable names, in declaration order
    pub fn var_names(&self) -> Vec<&str> {
        self.vars.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Declared type of a variable, if any
    pub fn var_type(&self, name: &str) -> Option<VarType> {
        self.var_types.get(name).copied()
    }

    /// Invariant names, in declaration order
    pub fn invariant_names(&self) -> Vec<String> {
        self.invariants.iter().map(|inv| inv.name.clone()).collect()
    }

    /// Action names, in declaration order
    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name.clone()).collect()
    }

    /// Whether exactly one action flag must be chosen
    pub fn one_hot_actions(&self) -> bool {
        self.one_hot_actions
    }

    pub(crate) fn vars(&self) -> &[(String, VarType)] {
        &self.vars
    }

    pub(crate) fn constants(&self) -> &BTreeMap<String, Scalar> {
        &self.constants
    }

    pub(crate) fn invariants(&self) -> &[TrackedAssertion] {
        &self.invariants
    }

    pub(crate) fn actions(&self) -> &[ActionGuard] {
        &self.actions
    }
}

/// Compile a policy document
///
/// Pipeline: declare variables, declare action flags, build the expression
/// environment (variables, flags, constants, combinators), then parse and
/// type-check every invariant assertion and action guard.
///
/// Variables, action flags, constants, and invariant names occupy one
/// namespace, and `forced_action` is reserved in it for the forced-action
/// assertion: tracked assertion names must never coincide with a declared
/// solver constant, or the tracking literal would alias the real term.
pub fn compile(doc: &PolicyDocument) -> CompileResult<CompiledPolicy> {
    let mut vars: Vec<(String, VarType)> = Vec::new();
    let mut var_types: HashMap<String, VarType> = HashMap::new();

    let groups = [
        (&doc.entities.reals, VarType::Real),
        (&doc.entities.ints, VarType::Int),
        (&doc.entities.bools, VarType::Bool),
    ];
    for (names, ty) in groups {
        for name in names.iter() {
            if name.is_empty() {
                return Err(SpecError::EmptyIdentifier("entities"));
            }
            if name.as_str() == FORCED_ACTION || var_types.insert(name.clone(), ty).is_some() {
                return Err(SpecError::DuplicateName(name.clone()));
            }
            vars.push((name.clone(), ty));
        }
    }

    // Action flags share one namespace with variables
    let mut env = TypeEnv::new();
    for (name, ty) in &vars {
        env.bind(name.clone(), *ty);
    }
    for action in &doc.actions {
        if action.name.is_empty() {
            return Err(SpecError::EmptyIdentifier("actions"));
        }
        if action.name == FORCED_ACTION
            || var_types.contains_key(&action.name)
            || doc.actions.iter().filter(|a| a.name == action.name).count() > 1
        {
            return Err(SpecError::DuplicateName(action.name.clone()));
        }
        env.bind(action.name.clone(), VarType::Bool);
    }

    for (name, value) in &doc.constants {
        if name.is_empty() {
            return Err(SpecError::EmptyIdentifier("constants"));
        }
        if name.as_str() == FORCED_ACTION || env.lookup(name).is_some() {
            return Err(SpecError::DuplicateName(name.clone()));
        }
        let ty = match value {
            Scalar::Bool(_) => VarType::Bool,
            Scalar::Int(_) => VarType::Int,
            Scalar::Float(f) if f.is_finite() => VarType::Real,
            _ => return Err(SpecError::UnsupportedConstant(name.clone())),
        };
        env.bind(name.clone(), ty);
    }

    let mut invariants = Vec::with_capacity(doc.invariants.len());
    let mut seen_invariants = HashSet::new();
    for inv in &doc.invariants {
        if inv.name.is_empty() {
            return Err(SpecError::EmptyIdentifier("invariants"));
        }
        if inv.name == FORCED_ACTION || env.lookup(&inv.name).is_some() {
            return Err(SpecError::DuplicateName(inv.name.clone()));
        }
        if !seen_invariants.insert(inv.name.clone()) {
            return Err(SpecError::DuplicateInvariant(inv.name.clone()));
        }
        let expr = compile_bool_expr(&inv.name, &inv.assertion, &env)?;
        invariants.push(TrackedAssertion { name: inv.name.clone(), expr });
    }

    let mut actions = Vec::with_capacity(doc.actions.len());
    for action in &doc.actions {
        let guard = compile_bool_expr(&action.name, &action.guard, &env)?;
        actions.push(ActionGuard { name: action.name.clone(), guard });
    }

    Ok(CompiledPolicy {
        id: doc.id.clone(),
        vars,
        var_types,
        constants: doc.constants.clone(),
        invariants,
        actions,
        one_hot_actions: doc.one_hot_actions,
    })
}

fn compile_bool_expr(name: &str, source: &str, env: &TypeEnv) -> CompileResult<Expr> {
    let expr = parse_expression(source).map_err(|source| SpecError::Parse {
        name: name.to_string(),
        source,
    })?;

    let ty = infer(env, &expr).map_err(|source| SpecError::Type {
        name: name.to_string(),
        source,
    })?;

    if ty != VarType::Bool {
        return Err(SpecError::NotBoolean { name: name.to_string(), got: ty });
    }

    Ok(expr)
}
