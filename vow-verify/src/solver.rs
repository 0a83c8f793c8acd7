#![forbid(unsafe_code)]

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::term::{Formula, Model};

/// Result of deciding one formula.
///
/// Formulas are refutation queries: unsatisfiable means the obligation holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Proved,
    Counterexample(Model),
    Unknown(String),
}

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverError {
    #[error("solver unavailable: {0}")]
    #[diagnostic(code(vow::solver::unavailable))]
    Unavailable(String),
    #[error("solver failed: {0}")]
    #[diagnostic(code(vow::solver::backend))]
    Backend(String),
}

pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, formula: &Formula) -> Result<CheckOutcome, SolverError>;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn check(&self, formula: &Formula) -> Result<CheckOutcome, SolverError> {
        (**self).check(formula)
    }
}

impl<S: Solver + ?Sized> Solver for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn check(&self, formula: &Formula) -> Result<CheckOutcome, SolverError> {
        (**self).check(formula)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtProfile {
    /// Interactive use.
    Fast,
    Ci,
    #[default]
    Thorough,
}

impl SmtProfile {
    pub fn default_timeout_ms(self) -> u32 {
        match self {
            SmtProfile::Fast => 50,
            SmtProfile::Ci => 250,
            SmtProfile::Thorough => 2000,
        }
    }
}

/// Stand-in used when no real backend was compiled in.
pub struct UnavailableSolver {
    reason: String,
}

impl UnavailableSolver {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Solver for UnavailableSolver {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn check(&self, _formula: &Formula) -> Result<CheckOutcome, SolverError> {
        Err(SolverError::Unavailable(self.reason.clone()))
    }
}

#[cfg(feature = "z3")]
pub mod z3_solver {
    use super::{CheckOutcome, Solver, SolverError};
    use crate::term::{Formula, Model, Sort, Term, Value};

    use z3::{
        ast::{Ast, Bool, Int},
        Config, Context, Params, SatResult,
    };

    enum Z3Value<'ctx> {
        Int(Int<'ctx>),
        Bool(Bool<'ctx>),
    }

    /// Z3 backend. Each check runs in its own context, so the solver can be
    /// shared across threads.
    pub struct Z3Solver {
        timeout_ms: u32,
    }

    impl Z3Solver {
        pub fn new(timeout_ms: u32) -> Self {
            Self { timeout_ms }
        }
    }

    fn as_int<'ctx>(v: Z3Value<'ctx>) -> Result<Int<'ctx>, SolverError> {
        match v {
            Z3Value::Int(i) => Ok(i),
            Z3Value::Bool(_) => Err(SolverError::Backend("expected an Int term".to_string())),
        }
    }

    fn as_bool<'ctx>(v: Z3Value<'ctx>) -> Result<Bool<'ctx>, SolverError> {
        match v {
            Z3Value::Bool(b) => Ok(b),
            Z3Value::Int(_) => Err(SolverError::Backend("expected a Bool term".to_string())),
        }
    }

    fn translate<'ctx>(ctx: &'ctx Context, t: &Term) -> Result<Z3Value<'ctx>, SolverError> {
        let int = |t: &Term| translate(ctx, t).and_then(as_int);
        let boolean = |t: &Term| translate(ctx, t).and_then(as_bool);
        Ok(match t {
            Term::Int(n) => Z3Value::Int(Int::from_i64(ctx, *n)),
            Term::Bool(b) => Z3Value::Bool(Bool::from_bool(ctx, *b)),
            Term::Var(s) => match s.sort {
                Sort::Int => Z3Value::Int(Int::new_const(ctx, s.name.as_str())),
                Sort::Bool => Z3Value::Bool(Bool::new_const(ctx, s.name.as_str())),
            },
            Term::Add(a, b) => Z3Value::Int(Int::add(ctx, &[&int(a)?, &int(b)?])),
            Term::Sub(a, b) => Z3Value::Int(Int::sub(ctx, &[&int(a)?, &int(b)?])),
            Term::Mul(a, b) => Z3Value::Int(Int::mul(ctx, &[&int(a)?, &int(b)?])),
            Term::Div(a, b) => Z3Value::Int(int(a)?.div(&int(b)?)),
            Term::Neg(a) => Z3Value::Int(int(a)?.unary_minus()),
            Term::Not(a) => Z3Value::Bool(boolean(a)?.not()),
            Term::And(parts) => {
                let parts = parts.iter().map(boolean).collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool<'ctx>> = parts.iter().collect();
                Z3Value::Bool(Bool::and(ctx, &refs))
            }
            Term::Or(parts) => {
                let parts = parts.iter().map(boolean).collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool<'ctx>> = parts.iter().collect();
                Z3Value::Bool(Bool::or(ctx, &refs))
            }
            Term::Implies(a, b) => Z3Value::Bool(boolean(a)?.implies(&boolean(b)?)),
            Term::Eq(a, b) => match (translate(ctx, a)?, translate(ctx, b)?) {
                (Z3Value::Int(x), Z3Value::Int(y)) => Z3Value::Bool(x._eq(&y)),
                (Z3Value::Bool(x), Z3Value::Bool(y)) => Z3Value::Bool(x._eq(&y)),
                _ => return Err(SolverError::Backend("equality over mixed sorts".to_string())),
            },
            Term::Lt(a, b) => Z3Value::Bool(int(a)?.lt(&int(b)?)),
            Term::Le(a, b) => Z3Value::Bool(int(a)?.le(&int(b)?)),
            Term::Gt(a, b) => Z3Value::Bool(int(a)?.gt(&int(b)?)),
            Term::Ge(a, b) => Z3Value::Bool(int(a)?.ge(&int(b)?)),
            Term::Ite(c, x, y) => {
                let c = boolean(c)?;
                match (translate(ctx, x)?, translate(ctx, y)?) {
                    (Z3Value::Int(x), Z3Value::Int(y)) => Z3Value::Int(c.ite(&x, &y)),
                    (Z3Value::Bool(x), Z3Value::Bool(y)) => Z3Value::Bool(c.ite(&x, &y)),
                    _ => return Err(SolverError::Backend("ite over mixed sorts".to_string())),
                }
            }
        })
    }

    impl Solver for Z3Solver {
        fn name(&self) -> &str {
            "z3"
        }

        fn check(&self, formula: &Formula) -> Result<CheckOutcome, SolverError> {
            let mut cfg = Config::new();
            cfg.set_model_generation(true);
            let ctx = Context::new(&cfg);
            let solver = z3::Solver::new(&ctx);

            let mut params = Params::new(&ctx);
            params.set_u32("timeout", self.timeout_ms);
            params.set_u32("smt.random_seed", 0);
            solver.set_params(&params);

            for a in &formula.assertions {
                solver.assert(&as_bool(translate(&ctx, a)?)?);
            }

            match solver.check() {
                SatResult::Unsat => Ok(CheckOutcome::Proved),
                SatResult::Unknown => Ok(CheckOutcome::Unknown(
                    solver
                        .get_reason_unknown()
                        .unwrap_or_else(|| "unknown".to_string()),
                )),
                SatResult::Sat => {
                    let model = solver
                        .get_model()
                        .ok_or_else(|| SolverError::Backend("sat without a model".to_string()))?;
                    let mut out = Model::default();
                    for s in formula.symbols() {
                        let value = match s.sort {
                            Sort::Int => {
                                let c = Int::new_const(&ctx, s.name.as_str());
                                match model.eval(&c, true) {
                                    Some(v) => match v.as_i64() {
                                        Some(n) => Value::Int(n),
                                        None => Value::Other(v.to_string()),
                                    },
                                    None => continue,
                                }
                            }
                            Sort::Bool => {
                                let c = Bool::new_const(&ctx, s.name.as_str());
                                match model.eval(&c, true).and_then(|v| v.as_bool()) {
                                    Some(b) => Value::Bool(b),
                                    None => continue,
                                }
                            }
                        };
                        out.insert(s.name, value);
                    }
                    Ok(CheckOutcome::Counterexample(out))
                }
            }
        }
    }
}
