//! Solver lowering and per-request check construction
//!
//! A compiled policy is pure data; the solver context exists only inside
//! [`CompiledPolicy::check_with`]. Each call builds a fresh Z3 solver with
//! unsat-core tracking, binds facts equationally, asserts every invariant
//! tracked under its declared name, wires action flags to their guards, and
//! runs one `check`. The solver context is dropped on return, which is what
//! makes compiled policies freely shareable across concurrent requests.

use crate::ast::nodes::{ArithOp, Combinator, CompareOp, Expr, Literal};
use crate::ast::types::VarType;
use crate::compiler::CompiledPolicy;
use crate::facts::{rational_parts, Facts, Scalar};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use z3::ast::{Ast, Bool, Int, Real};
use z3::{Config, Context, Model, Params, SatResult, Solver};

/// Reserved tracking name for the forced-action assertion. When a check is
/// run with a forced action, an unsat core may cite this name alongside
/// invariant names. Compilation rejects any declaration using this name, so
/// the tracking literal can never alias a declared term.
pub const FORCED_ACTION: &str = "forced_action";

/// A fact's value did not match its declared variable type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("fact `{name}` is incompatible with its declared {expected} variable (got {got})")]
    TypeMismatch { name: String, expected: VarType, got: &'static str },

    #[error("fact `{name}` is not a finite, representable number")]
    NotRepresentable { name: String },
}

/// Per-check failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("internal solver failure: {0}")]
    Internal(&'static str),
}

/// Raw solver verdict for one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverVerdict {
    Sat,
    Unsat,
    Unknown,
}

/// Outcome of one solver check, already detached from the solver context
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub verdict: SolverVerdict,
    /// First action flag the model evaluates true, in declaration order
    pub chosen_action: Option<String>,
    /// Primitive-coerced assignments for declared variables and action flags
    pub model: BTreeMap<String, Scalar>,
    /// Tracked assertion names in the unsat core
    pub unsat_core: Vec<String>,
}

impl CheckOutcome {
    fn empty(verdict: SolverVerdict) -> Self {
        Self {
            verdict,
            chosen_action: None,
            model: BTreeMap::new(),
            unsat_core: Vec::new(),
        }
    }
}

impl CompiledPolicy {
    /// Build a fresh solver context for `facts` (and an optional forced
    /// action), run one check, and extract the outcome.
    pub(crate) fn check_with(
        &self,
        facts: &Facts,
        forced_action: Option<&str>,
        deadline: Option<Duration>,
    ) -> Result<CheckOutcome, CheckError> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let solver = Solver::new(&ctx);

        let mut params = Params::new(&ctx);
        params.set_bool("unsat_core", true);
        params.set_bool("core.minimize", true);
        if let Some(deadline) = deadline {
            let ms = deadline.as_millis().min(u128::from(u32::MAX)) as u32;
            params.set_u32("timeout", ms);
        }
        solver.set_params(&params);

        // Declare variables and action flags; both share the expression env.
        let mut env: HashMap<String, Atom<'_>> = HashMap::new();
        for (name, ty) in self.vars() {
            let atom = match ty {
                VarType::Real => Atom::Real(Real::new_const(&ctx, name.as_str())),
                VarType::Int => Atom::Int(Int::new_const(&ctx, name.as_str())),
                VarType::Bool => Atom::Bool(Bool::new_const(&ctx, name.as_str())),
            };
            env.insert(name.clone(), atom);
        }

        let mut flags: Vec<(String, Bool<'_>)> = Vec::with_capacity(self.actions().len());
        for action in self.actions() {
            let flag = Bool::new_const(&ctx, action.name.as_str());
            env.insert(action.name.clone(), Atom::Bool(flag.clone()));
            flags.push((action.name.clone(), flag));
        }

        for (name, value) in self.constants() {
            let atom = constant_atom(&ctx, value)?;
            env.insert(name.clone(), atom);
        }

        // Equality bindings from facts; unknown names are ignored.
        for (name, value) in facts {
            let ty = match self.var_type(name) {
                Some(ty) => ty,
                None => continue,
            };
            let binding = bind_fact(&ctx, &env, name, ty, value)?;
            solver.assert(&binding);
        }

        // Invariants, tracked under their policy-declared names. The
        // tracking literals are fresh by construction: compilation keeps
        // invariant names and the reserved marker out of the declared
        // variable/action/constant namespace.
        for inv in self.invariants() {
            let term = lower(&ctx, &inv.expr, &env)?.into_bool()?;
            solver.assert_and_track(&term, &Bool::new_const(&ctx, inv.name.as_str()));
        }

        // Choosing an action commits to its guard.
        for (action, (_, flag)) in self.actions().iter().zip(flags.iter()) {
            let guard = lower(&ctx, &action.guard, &env)?.into_bool()?;
            solver.assert(&flag.implies(&guard));
        }

        if !flags.is_empty() {
            let flag_refs: Vec<&Bool<'_>> = flags.iter().map(|(_, flag)| flag).collect();
            solver.assert(&Bool::or(&ctx, &flag_refs));

            if self.one_hot_actions() {
                let one = Int::from_i64(&ctx, 1);
                let zero = Int::from_i64(&ctx, 0);
                let picks: Vec<Int<'_>> =
                    flags.iter().map(|(_, flag)| flag.ite(&one, &zero)).collect();
                let pick_refs: Vec<&Int<'_>> = picks.iter().collect();
                solver.assert(&Int::add(&ctx, &pick_refs)._eq(&one));
            }
        }

        if let Some(forced) = forced_action {
            let marker = Bool::new_const(&ctx, FORCED_ACTION);
            match flags.iter().find(|(name, _)| name.as_str() == forced) {
                Some((_, flag)) => solver.assert_and_track(flag, &marker),
                // Unknown forced action: make the check fail cleanly.
                None => solver.assert_and_track(&Bool::from_bool(&ctx, false), &marker),
            }
        }

        match solver.check() {
            SatResult::Sat => {
                let model = solver
                    .get_model()
                    .ok_or(CheckError::Internal("model unavailable after sat"))?;

                let mut chosen_action = None;
                for (name, flag) in &flags {
                    if eval_bool(&model, flag).unwrap_or(false) {
                        chosen_action = Some(name.clone());
                        break;
                    }
                }

                let mut assignments = BTreeMap::new();
                for (name, _) in self.vars() {
                    if let Some(atom) = env.get(name) {
                        if let Some(value) = model_value(&model, atom) {
                            assignments.insert(name.clone(), value);
                        }
                    }
                }
                for (name, flag) in &flags {
                    if let Some(value) = eval_bool(&model, flag) {
                        assignments.insert(name.clone(), Scalar::Bool(value));
                    }
                }

                Ok(CheckOutcome {
                    verdict: SolverVerdict::Sat,
                    chosen_action,
                    model: assignments,
                    unsat_core: Vec::new(),
                })
            },

            SatResult::Unsat => {
                let unsat_core = solver
                    .get_unsat_core()
                    .iter()
                    .map(|marker| marker.to_string())
                    .collect();
                Ok(CheckOutcome {
                    verdict: SolverVerdict::Unsat,
                    chosen_action: None,
                    model: BTreeMap::new(),
                    unsat_core,
                })
            },

            SatResult::Unknown => Ok(CheckOutcome::empty(SolverVerdict::Unknown)),
        }
    }
}

/// A lowered solver term, tagged by sort
#[derive(Debug, Clone)]
enum Atom<'ctx> {
    Bool(Bool<'ctx>),
    Int(Int<'ctx>),
    Real(Real<'ctx>),
}

impl<'ctx> Atom<'ctx> {
    fn into_bool(self) -> Result<Bool<'ctx>, CheckError> {
        match self {
            Atom::Bool(term) => Ok(term),
            _ => Err(CheckError::Internal("expected a boolean term")),
        }
    }

    fn to_real(&self) -> Result<Real<'ctx>, CheckError> {
        match self {
            Atom::Real(term) => Ok(term.clone()),
            Atom::Int(term) => Ok(Real::from_int(term)),
            Atom::Bool(_) => Err(CheckError::Internal("expected a numeric term")),
        }
    }
}

fn constant_atom<'ctx>(ctx: &'ctx Context, value: &Scalar) -> Result<Atom<'ctx>, CheckError> {
    match value {
        Scalar::Bool(b) => Ok(Atom::Bool(Bool::from_bool(ctx, *b))),
        Scalar::Int(n) => Ok(Atom::Int(Int::from_i64(ctx, *n))),
        Scalar::Float(f) => {
            let (num, den) = rational_parts(*f)
                .ok_or(CheckError::Internal("constant is not a representable rational"))?;
            Ok(Atom::Real(real_numeral(ctx, num, den)))
        },
        // Compilation rejects string constants before a check can see one.
        Scalar::Str(_) => Err(CheckError::Internal("string constant reached the solver")),
    }
}

fn bind_fact<'ctx>(
    ctx: &'ctx Context,
    env: &HashMap<String, Atom<'ctx>>,
    name: &str,
    ty: VarType,
    value: &Scalar,
) -> Result<Bool<'ctx>, CheckError> {
    let atom = env
        .get(name)
        .ok_or(CheckError::Internal("declared variable missing from env"))?;

    let mismatch = || {
        CheckError::Binding(BindingError::TypeMismatch {
            name: name.to_string(),
            expected: ty,
            got: value.type_name(),
        })
    };

    match (atom, value) {
        (Atom::Bool(var), Scalar::Bool(b)) => Ok(var._eq(&Bool::from_bool(ctx, *b))),
        (Atom::Int(var), Scalar::Int(n)) => Ok(var._eq(&Int::from_i64(ctx, *n))),
        (Atom::Real(var), Scalar::Int(n)) => {
            Ok(var._eq(&Real::from_int(&Int::from_i64(ctx, *n))))
        },
        (Atom::Real(var), Scalar::Float(f)) => {
            if !f.is_finite() {
                return Err(CheckError::Binding(BindingError::NotRepresentable {
                    name: name.to_string(),
                }));
            }
            let (num, den) = rational_parts(*f).ok_or(CheckError::Binding(
                BindingError::NotRepresentable { name: name.to_string() },
            ))?;
            Ok(var._eq(&real_numeral(ctx, num, den)))
        },
        _ => Err(mismatch()),
    }
}

/// Exact rational numeral: `num / den` over real constants
fn real_numeral<'ctx>(ctx: &'ctx Context, num: i64, den: i64) -> Real<'ctx> {
    let numerator = Real::from_int(&Int::from_i64(ctx, num));
    if den == 1 {
        numerator
    } else {
        numerator.div(&Real::from_int(&Int::from_i64(ctx, den)))
    }
}

fn lower<'ctx>(
    ctx: &'ctx Context,
    expr: &Expr,
    env: &HashMap<String, Atom<'ctx>>,
) -> Result<Atom<'ctx>, CheckError> {
    match expr {
        Expr::Literal(Literal::Int(n)) => Ok(Atom::Int(Int::from_i64(ctx, *n))),
        Expr::Literal(Literal::Real(r)) => {
            let (num, den) = rational_parts(*r)
                .ok_or(CheckError::Internal("rational literal out of range"))?;
            Ok(Atom::Real(real_numeral(ctx, num, den)))
        },
        Expr::Literal(Literal::Bool(b)) => Ok(Atom::Bool(Bool::from_bool(ctx, *b))),

        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or(CheckError::Internal("unresolved identifier reached the solver")),

        Expr::Neg(operand) => match lower(ctx, operand, env)? {
            Atom::Int(term) => Ok(Atom::Int(term.unary_minus())),
            Atom::Real(term) => Ok(Atom::Real(term.unary_minus())),
            Atom::Bool(_) => Err(CheckError::Internal("negation of a boolean term")),
        },

        Expr::Arith { left, op, right } => {
            let left = lower(ctx, left, env)?;
            let right = lower(ctx, right, env)?;
            lower_arith(ctx, *op, left, right)
        },

        Expr::Compare { left, op, right } => {
            let left = lower(ctx, left, env)?;
            let right = lower(ctx, right, env)?;
            lower_compare(ctx, *op, left, right)
        },

        Expr::Call { func, args } => lower_call(ctx, *func, args, env),

        Expr::List(_) => Err(CheckError::Internal("list term outside a combinator")),
    }
}

fn lower_arith<'ctx>(
    ctx: &'ctx Context,
    op: ArithOp,
    left: Atom<'ctx>,
    right: Atom<'ctx>,
) -> Result<Atom<'ctx>, CheckError> {
    // Int op Int stays in integer arithmetic (solver-native `/` included);
    // any Real operand promotes both sides.
    match (&left, &right) {
        (Atom::Int(a), Atom::Int(b)) => Ok(Atom::Int(match op {
            ArithOp::Add => Int::add(ctx, &[a, b]),
            ArithOp::Sub => Int::sub(ctx, &[a, b]),
            ArithOp::Mul => Int::mul(ctx, &[a, b]),
            ArithOp::Div => a.div(b),
        })),
        _ => {
            let a = left.to_real()?;
            let b = right.to_real()?;
            Ok(Atom::Real(match op {
                ArithOp::Add => Real::add(ctx, &[&a, &b]),
                ArithOp::Sub => Real::sub(ctx, &[&a, &b]),
                ArithOp::Mul => Real::mul(ctx, &[&a, &b]),
                ArithOp::Div => a.div(&b),
            }))
        },
    }
}

fn lower_compare<'ctx>(
    ctx: &'ctx Context,
    op: CompareOp,
    left: Atom<'ctx>,
    right: Atom<'ctx>,
) -> Result<Atom<'ctx>, CheckError> {
    let term = match op {
        CompareOp::Eq | CompareOp::Neq => {
            let eq = match (&left, &right) {
                (Atom::Bool(a), Atom::Bool(b)) => a._eq(b),
                (Atom::Int(a), Atom::Int(b)) => a._eq(b),
                _ => left.to_real()?._eq(&right.to_real()?),
            };
            if op == CompareOp::Neq {
                eq.not()
            } else {
                eq
            }
        },
        _ => {
            let (a, b) = match (&left, &right) {
                (Atom::Int(a), Atom::Int(b)) => {
                    return Ok(Atom::Bool(match op {
                        CompareOp::Lt => a.lt(b),
                        CompareOp::LtEq => a.le(b),
                        CompareOp::Gt => a.gt(b),
                        CompareOp::GtEq => a.ge(b),
                        _ => return Err(CheckError::Internal("unexpected comparison operator")),
                    }))
                },
                _ => (left.to_real()?, right.to_real()?),
            };
            match op {
                CompareOp::Lt => a.lt(&b),
                CompareOp::LtEq => a.le(&b),
                CompareOp::Gt => a.gt(&b),
                CompareOp::GtEq => a.ge(&b),
                _ => return Err(CheckError::Internal("unexpected comparison operator")),
            }
        },
    };
    Ok(Atom::Bool(term))
}

fn lower_call<'ctx>(
    ctx: &'ctx Context,
    func: Combinator,
    args: &[Expr],
    env: &HashMap<String, Atom<'ctx>>,
) -> Result<Atom<'ctx>, CheckError> {
    // And([a, b]) and And(a, b) are interchangeable, same for Or and Sum.
    let flat: &[Expr] = match args {
        [Expr::List(items)] if func.accepts_list() => items,
        _ => args,
    };

    match func {
        Combinator::And | Combinator::Or => {
            let mut terms = Vec::with_capacity(flat.len());
            for arg in flat {
                terms.push(lower(ctx, arg, env)?.into_bool()?);
            }
            let refs: Vec<&Bool<'_>> = terms.iter().collect();
            Ok(Atom::Bool(match func {
                Combinator::And => Bool::and(ctx, &refs),
                _ => Bool::or(ctx, &refs),
            }))
        },

        Combinator::Not => {
            let operand = flat
                .first()
                .ok_or(CheckError::Internal("Not without operand"))?;
            Ok(Atom::Bool(lower(ctx, operand, env)?.into_bool()?.not()))
        },

        Combinator::Implies => {
            let (lhs, rhs) = match flat {
                [lhs, rhs] => (lhs, rhs),
                _ => return Err(CheckError::Internal("Implies expects two operands")),
            };
            let lhs = lower(ctx, lhs, env)?.into_bool()?;
            let rhs = lower(ctx, rhs, env)?.into_bool()?;
            Ok(Atom::Bool(lhs.implies(&rhs)))
        },

        Combinator::Sum => {
            let atoms = flat
                .iter()
                .map(|arg| lower(ctx, arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            if atoms.iter().all(|atom| matches!(atom, Atom::Int(_))) {
                let terms: Vec<Int<'_>> = atoms
                    .into_iter()
                    .filter_map(|atom| match atom {
                        Atom::Int(term) => Some(term),
                        _ => None,
                    })
                    .collect();
                let refs: Vec<&Int<'_>> = terms.iter().collect();
                Ok(Atom::Int(Int::add(ctx, &refs)))
            } else {
                let terms = atoms
                    .iter()
                    .map(Atom::to_real)
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Real<'_>> = terms.iter().collect();
                Ok(Atom::Real(Real::add(ctx, &refs)))
            }
        },

        Combinator::If => {
            let (cond, then_arm, else_arm) = match flat {
                [cond, then_arm, else_arm] => (cond, then_arm, else_arm),
                _ => return Err(CheckError::Internal("If expects three operands")),
            };
            let cond = lower(ctx, cond, env)?.into_bool()?;
            let then_atom = lower(ctx, then_arm, env)?;
            let else_atom = lower(ctx, else_arm, env)?;
            match (&then_atom, &else_atom) {
                (Atom::Bool(a), Atom::Bool(b)) => Ok(Atom::Bool(cond.ite(a, b))),
                (Atom::Int(a), Atom::Int(b)) => Ok(Atom::Int(cond.ite(a, b))),
                _ => {
                    let a = then_atom.to_real()?;
                    let b = else_atom.to_real()?;
                    Ok(Atom::Real(cond.ite(&a, &b)))
                },
            }
        },
    }
}

fn eval_bool(model: &Model<'_>, term: &Bool<'_>) -> Option<bool> {
    model.eval(term, true).and_then(|value| value.as_bool())
}

fn model_value(model: &Model<'_>, atom: &Atom<'_>) -> Option<Scalar> {
    match atom {
        Atom::Bool(term) => eval_bool(model, term).map(Scalar::Bool),
        Atom::Int(term) => model
            .eval(term, true)
            .and_then(|value| value.as_i64())
            .map(Scalar::Int),
        Atom::Real(term) => model
            .eval(term, true)
            .and_then(|value| value.as_real())
            .map(|(num, den)| Scalar::Float(coerce_real(num, den))),
    }
}

/// Lossy real-to-float coercion: render to twelve decimal digits, reparse.
fn coerce_real(num: i64, den: i64) -> f64 {
    let quotient = num as f64 / den as f64;
    parse_decimal(&format!("{:.12}", quotient)).unwrap_or(quotient)
}

/// Parse a decimal rendering, stripping the solver's trailing approximation
/// marker if present.
fn parse_decimal(text: &str) -> Option<f64> {
    let text = text.strip_suffix('?').unwrap_or(text);
    text.parse().ok()
}
