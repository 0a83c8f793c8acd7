#![forbid(unsafe_code)]

pub mod alias;
pub mod bounded;
pub mod counterexample;
pub mod encode;
pub mod engine;
pub mod report;
pub mod solver;
pub mod term;
pub mod violation;

pub use alias::{AliasError, AliasName, AliasTable, Divergence, Merged};
pub use bounded::BoundedSolver;
pub use counterexample::{Binding, Counterexample, CounterexampleMapper};
pub use encode::{EncodeError, Encoder};
pub use engine::{Engine, EngineConfig};
pub use report::{
    duration_ms, ClassOutcome, ClassReport, InconclusiveReason, MethodReport, ObligationKind, ObligationReport,
    ObligationStatus, Totals,
};
pub use solver::{CheckOutcome, SmtProfile, Solver, SolverError, UnavailableSolver};
#[cfg(feature = "z3")]
pub use solver::z3_solver::Z3Solver;
pub use term::{Formula, Model, Sort, Symbol, Term, Value};
pub use violation::{EnsureViolation, InvariantViolation, RequireViolation, VerifyError, Violation};
