//! Static type checking for constraint expressions
//!
//! Every invariant assertion and action guard is checked against the declared
//! variable, action-flag, and constant environment at policy compile time, so
//! ill-typed expressions never reach the solver.

use super::nodes::{ArithOp, Combinator, CompareOp, Expr, Literal};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Solver-facing type of a declared variable or inferred expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Real,
    Int,
    Bool,
}

impl VarType {
    /// Whether this type participates in arithmetic and ordering
    pub fn is_numeric(self) -> bool {
        matches!(self, VarType::Real | VarType::Int)
    }

    /// Solver-native promotion for mixed Int/Real operands
    pub fn promote(self, other: VarType) -> Option<VarType> {
        match (self, other) {
            (VarType::Int, VarType::Int) => Some(VarType::Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(VarType::Real),
            _ => None,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Real => write!(f, "Real"),
            VarType::Int => write!(f, "Int"),
            VarType::Bool => write!(f, "Bool"),
        }
    }
}

/// Type error raised while checking an expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("{func} expects {expected} argument(s), got {got}")]
    ArityMismatch { func: Combinator, expected: &'static str, got: usize },

    #[error("cannot compare {left} {op} {right}")]
    Comparison { op: CompareOp, left: VarType, right: VarType },

    #[error("{context} requires a numeric operand, got {got}")]
    NotNumeric { context: &'static str, got: VarType },

    #[error("{context} requires a boolean operand, got {got}")]
    NotBoolean { context: &'static str, got: VarType },

    #[error("If branches must agree, got {then_ty} and {else_ty}")]
    BranchMismatch { then_ty: VarType, else_ty: VarType },

    #[error("division by literal zero")]
    DivisionByZero,

    #[error("list is only allowed as the sole argument of And, Or, or Sum")]
    ListNotAllowed,
}

/// Typing environment: declared variables, action flags, and constants
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    symbols: HashMap<String, VarType>,
}

impl TypeEnv {
    /// Create an empty environment
    pub fn new() -> Self {
        Self { symbols: HashMap::new() }
    }

    /// Bind a symbol to a type
    pub fn bind(&mut self, name: impl Into<String>, ty: VarType) {
        self.symbols.insert(name.into(), ty);
    }

    /// Look up a symbol
    pub fn lookup(&self, name: &str) -> Option<VarType> {
        self.symbols.get(name).copied()
    }
}

/// Infer the type of an expression, rejecting ill-typed forms
pub fn infer(env: &TypeEnv, expr: &Expr) -> Result<VarType, TypeError> {
    match expr {
        Expr::Literal(Literal::Int(_)) => Ok(VarType::Int),
        Expr::Literal(Literal::Real(_)) => Ok(VarType::Real),
        Expr::Literal(Literal::Bool(_)) => Ok(VarType::Bool),

        Expr::Ident(name) => env
            .lookup(name)
            .ok_or_else(|| TypeError::UnknownIdentifier(name.clone())),

        Expr::Neg(operand) => {
            let ty = infer(env, operand)?;
            if ty.is_numeric() {
                Ok(ty)
            } else {
                Err(TypeError::NotNumeric { context: "negation", got: ty })
            }
        },

        Expr::Arith { left, op, right } => {
            if *op == ArithOp::Div && is_literal_zero(right) {
                return Err(TypeError::DivisionByZero);
            }
            let lt = infer(env, left)?;
            let rt = infer(env, right)?;
            if !lt.is_numeric() {
                return Err(TypeError::NotNumeric { context: "arithmetic", got: lt });
            }
            if !rt.is_numeric() {
                return Err(TypeError::NotNumeric { context: "arithmetic", got: rt });
            }
            // promote() cannot fail for two numeric operands
            lt.promote(rt)
                .ok_or(TypeError::NotNumeric { context: "arithmetic", got: rt })
        },

        Expr::Compare { left, op, right } => {
            let lt = infer(env, left)?;
            let rt = infer(env, right)?;
            let ok = match op {
                CompareOp::Eq | CompareOp::Neq => {
                    (lt.is_numeric() && rt.is_numeric()) || (lt == VarType::Bool && rt == VarType::Bool)
                },
                _ => lt.is_numeric() && rt.is_numeric(),
            };
            if ok {
                Ok(VarType::Bool)
            } else {
                Err(TypeError::Comparison { op: *op, left: lt, right: rt })
            }
        },

        Expr::Call { func, args } => infer_call(env, *func, args),

        Expr::List(_) => Err(TypeError::ListNotAllowed),
    }
}

fn infer_call(env: &TypeEnv, func: Combinator, args: &[Expr]) -> Result<VarType, TypeError> {
    // And([a, b]) and And(a, b) are interchangeable; same for Or and Sum.
    let flat: &[Expr] = match args {
        [Expr::List(items)] if func.accepts_list() => items,
        _ => args,
    };

    match func {
        Combinator::And | Combinator::Or => {
            if flat.is_empty() {
                return Err(TypeError::ArityMismatch { func, expected: "at least 1", got: 0 });
            }
            for arg in flat {
                let ty = infer(env, arg)?;
                if ty != VarType::Bool {
                    return Err(TypeError::NotBoolean { context: "combinator argument", got: ty });
                }
            }
            Ok(VarType::Bool)
        },

        Combinator::Not => {
            if flat.len() != 1 {
                return Err(TypeError::ArityMismatch { func, expected: "1", got: flat.len() });
            }
            let ty = infer(env, &flat[0])?;
            if ty != VarType::Bool {
                return Err(TypeError::NotBoolean { context: "Not argument", got: ty });
            }
            Ok(VarType::Bool)
        },

        Combinator::Implies => {
            if flat.len() != 2 {
                return Err(TypeError::ArityMismatch { func, expected: "2", got: flat.len() });
            }
            for arg in flat {
                let ty = infer(env, arg)?;
                if ty != VarType::Bool {
                    return Err(TypeError::NotBoolean { context: "Implies argument", got: ty });
                }
            }
            Ok(VarType::Bool)
        },

        Combinator::Sum => {
            if flat.is_empty() {
                return Err(TypeError::ArityMismatch { func, expected: "at least 1", got: 0 });
            }
            let mut acc = VarType::Int;
            for arg in flat {
                let ty = infer(env, arg)?;
                if !ty.is_numeric() {
                    return Err(TypeError::NotNumeric { context: "Sum argument", got: ty });
                }
                if ty == VarType::Real {
                    acc = VarType::Real;
                }
            }
            Ok(acc)
        },

        Combinator::If => {
            if flat.len() != 3 {
                return Err(TypeError::ArityMismatch { func, expected: "3", got: flat.len() });
            }
            let cond = infer(env, &flat[0])?;
            if cond != VarType::Bool {
                return Err(TypeError::NotBoolean { context: "If condition", got: cond });
            }
            let then_ty = infer(env, &flat[1])?;
            let else_ty = infer(env, &flat[2])?;
            if then_ty == VarType::Bool && else_ty == VarType::Bool {
                Ok(VarType::Bool)
            } else {
                then_ty
                    .promote(else_ty)
                    .ok_or(TypeError::BranchMismatch { then_ty, else_ty })
            }
        },
    }
}

fn is_literal_zero(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(Literal::Int(n)) => *n == 0,
        Expr::Literal(Literal::Real(r)) => *r == 0.0,
        _ => false,
    }
}
