#![forbid(unsafe_code)]

//! Builds proof obligations for a class and discharges them.
//!
//! Every obligation is a refutation query: the assumptions, the encoded body
//! and the negated goal are handed to the solver, and an unsatisfiable
//! answer proves the goal. The one exception is the precondition check,
//! where a satisfiable answer is the good outcome.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};
use vow_model::{field_logical_name, ClassModel, Clause, Decl, Ensure, Invariant, Literal, Location, Method, MethodName};

use crate::alias::AliasTable;
use crate::counterexample::{Counterexample, CounterexampleMapper};
use crate::encode::{EncodeError, Encoder, RESULT_NAME};
use crate::report::{
    duration_ms, ClassOutcome, ClassReport, InconclusiveReason, MethodReport, ObligationKind, ObligationReport,
    ObligationStatus,
};
use crate::solver::{CheckOutcome, Solver, SolverError};
use crate::term::{Formula, Sort, Term};
use crate::violation::{EnsureViolation, InvariantViolation, RequireViolation, Violation};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Verify the methods of a class on the rayon pool.
    pub parallel: bool,
    /// Attach the SMT-LIB2 text of each query to its report.
    pub emit_smt: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            emit_smt: false,
        }
    }
}

/// What one method-level obligation is about.
#[derive(Clone, Copy)]
enum Goal<'m> {
    Precondition,
    Ensure(&'m Ensure),
    Preservation(&'m Invariant),
}

impl Goal<'_> {
    fn kind(&self) -> ObligationKind {
        match self {
            Goal::Precondition => ObligationKind::Precondition,
            Goal::Ensure(_) => ObligationKind::Ensure,
            Goal::Preservation(_) => ObligationKind::InvariantPreservation,
        }
    }

    fn subject(&self, method: &Method) -> (String, Location) {
        match self {
            Goal::Precondition => (requires_text(method), requires_location(method)),
            Goal::Ensure(c) | Goal::Preservation(c) => (c.text().to_string(), c.location()),
        }
    }
}

fn requires_text(method: &Method) -> String {
    method
        .requires
        .iter()
        .map(Clause::text)
        .collect::<Vec<_>>()
        .join(" && ")
}

fn requires_location(method: &Method) -> Location {
    method
        .requires
        .first()
        .map(Clause::location)
        .unwrap_or(method.location)
}

/// Obligations a method contributes, in reporting order.
fn goals<'m>(class: &'m ClassModel, method: &'m Method) -> Vec<Goal<'m>> {
    let mut out = Vec::new();
    if !method.requires.is_empty() {
        out.push(Goal::Precondition);
    }
    out.extend(method.ensures.iter().map(Goal::Ensure));
    if method.is_public() {
        out.extend(class.invariants().iter().map(Goal::Preservation));
    }
    out
}

fn clause_expr(clause: &Clause) -> Result<&vow_model::Expression, EncodeError> {
    match clause {
        Clause::Supported { expr, .. } => Ok(expr),
        Clause::Unsupported { location, .. } => Err(EncodeError::UnsupportedReached(*location)),
    }
}

/// Symbolic state of one method: entry and exit tables plus assertions.
struct MethodState {
    encoder: Encoder,
    entry: AliasTable,
    exit: AliasTable,
    requires: Vec<Term>,
    body: Vec<Term>,
}

impl MethodState {
    fn build(class: &ClassModel, method: &Method) -> Result<Self, EncodeError> {
        let mut encoder = Encoder::new();
        let mut table = AliasTable::new();
        for f in class.supported_fields() {
            encoder.declare(&mut table, &field_logical_name(&f.name), &f.ty)?;
        }
        for p in method.parameters.iter().filter_map(Decl::supported) {
            encoder.declare(&mut table, p.name.as_str(), &p.ty)?;
        }
        for l in method.locals.iter().filter_map(Decl::supported) {
            encoder.declare(&mut table, l.name.as_str(), &l.ty)?;
        }
        encoder.begin_body(&mut table, &method.return_type)?;
        let entry = table.clone();

        let requires = method
            .requires
            .iter()
            .map(|r| encoder.encode_condition(clause_expr(r)?, &entry))
            .collect::<Result<Vec<_>, _>>()?;

        encoder.encode_body(&method.body, &mut table)?;
        let body = encoder.take_assertions();
        Ok(Self {
            encoder,
            entry,
            exit: table,
            requires,
            body,
        })
    }

    fn formula(&self, goal: Goal<'_>) -> Result<Formula, EncodeError> {
        let mut assertions = self.requires.clone();
        match goal {
            Goal::Precondition => {}
            Goal::Ensure(c) => {
                let post = self.encoder.encode_condition(clause_expr(c)?, &self.exit)?;
                assertions.extend(self.body.iter().cloned());
                assertions.push(Term::not(post));
            }
            Goal::Preservation(c) => {
                let expr = clause_expr(c)?;
                let pre = self.encoder.encode_condition(expr, &self.entry)?;
                let post = self.encoder.encode_condition(expr, &self.exit)?;
                assertions.push(pre);
                assertions.extend(self.body.iter().cloned());
                assertions.push(Term::not(post));
            }
        }
        Ok(Formula::new(assertions))
    }
}

/// Logical name to declared type, for counterexample mapping.
fn type_context(class: &ClassModel, method: Option<&Method>) -> BTreeMap<String, String> {
    let mut types: BTreeMap<String, String> = class
        .supported_fields()
        .map(|f| (field_logical_name(&f.name), f.ty.to_string()))
        .collect();
    if let Some(m) = method {
        for p in m.parameters.iter().filter_map(Decl::supported) {
            types.insert(p.name.to_string(), p.ty.to_string());
        }
        for l in m.locals.iter().filter_map(Decl::supported) {
            types.insert(l.name.to_string(), l.ty.to_string());
        }
        types.insert(RESULT_NAME.to_string(), m.return_type.to_string());
    }
    types
}

fn inconclusive(err: SolverError) -> ObligationStatus {
    ObligationStatus::Inconclusive(match err {
        SolverError::Unavailable(r) => InconclusiveReason::SolverUnavailable(r),
        SolverError::Backend(r) => InconclusiveReason::InternalFault(r),
    })
}

pub struct Engine<'s> {
    solver: &'s dyn Solver,
    config: EngineConfig,
}

impl<'s> Engine<'s> {
    pub fn new(solver: &'s dyn Solver) -> Self {
        Self::with_config(solver, EngineConfig::default())
    }

    pub fn with_config(solver: &'s dyn Solver, config: EngineConfig) -> Self {
        Self { solver, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Verifies every supported method of `class`.
    ///
    /// A class with any unsupported element yields a single `Unsupported`
    /// outcome and no solver query is made.
    pub fn verify_class(&self, class: &ClassModel) -> ClassReport {
        let started = Instant::now();
        let outcome = if !class.is_sealed() {
            ClassOutcome::Fault {
                message: format!("class `{}` has unsealed tables", class.name()),
            }
        } else if let Some(location) = class.first_unsupported() {
            warn!(class = %class.name(), %location, "class contains unsupported constructs; skipped");
            ClassOutcome::Unsupported { location }
        } else {
            let initial = self.initial_state(class);
            let methods: Vec<&Method> = class.supported_methods().collect();
            let methods = if self.config.parallel {
                methods.par_iter().map(|m| self.verify_method(class, m)).collect()
            } else {
                methods.iter().map(|m| self.verify_method(class, m)).collect()
            };
            ClassOutcome::Checked { initial, methods }
        };

        let report = ClassReport {
            class: class.name().clone(),
            solver: self.solver.name().to_string(),
            duration_ms: duration_ms(started.elapsed()),
            outcome,
        };
        info!(class = %report.class, totals = %report.totals(), "class verified");
        report
    }

    pub fn verify_method(&self, class: &ClassModel, method: &Method) -> MethodReport {
        let mapper = CounterexampleMapper::new(type_context(class, Some(method)));
        let state = MethodState::build(class, method);
        let obligations = goals(class, method)
            .into_iter()
            .map(|goal| {
                let started = Instant::now();
                let (subject, location) = goal.subject(method);
                let formula = state.as_ref().map_err(Clone::clone).and_then(|s| s.formula(goal));
                let (status, smt) = match formula {
                    Err(e) => (ObligationStatus::Inconclusive(InconclusiveReason::InternalFault(e.to_string())), None),
                    Ok(f) => {
                        trace!(method = %method.name, smt = %f.to_smtlib2(), "query");
                        let status = self.discharge(&f, &mapper, |cex| match goal {
                            Goal::Precondition => Violation::Require(RequireViolation {
                                method: method.name.clone(),
                                assertion: subject.clone(),
                                location,
                                call: None,
                            }),
                            Goal::Ensure(c) => Violation::Ensure(EnsureViolation {
                                method: method.name.clone(),
                                ensure: c.clone(),
                                counterexample: cex,
                            }),
                            Goal::Preservation(c) => Violation::Invariant(InvariantViolation {
                                invariant: c.clone(),
                                method: Some(method.name.clone()),
                                counterexample: cex,
                            }),
                        }, matches!(goal, Goal::Precondition));
                        (status, self.config.emit_smt.then(|| f.to_smtlib2()))
                    }
                };
                self.report(goal.kind(), Some(&method.name), subject, location, started, status, smt)
            })
            .collect();
        MethodReport {
            method: method.name.clone(),
            obligations,
        }
    }

    /// Each invariant must hold for the field initializers alone; a field
    /// without one starts at 0 or false.
    fn initial_state(&self, class: &ClassModel) -> Vec<ObligationReport> {
        if class.invariants().is_empty() {
            return Vec::new();
        }
        let mapper = CounterexampleMapper::new(type_context(class, None));
        let setup = || -> Result<(Encoder, AliasTable), EncodeError> {
            let mut encoder = Encoder::new();
            let mut table = AliasTable::new();
            for f in class.supported_fields() {
                let alias = encoder.declare(&mut table, &field_logical_name(&f.name), &f.ty)?;
                let value = match (f.initializer, encoder.sort(alias.base())) {
                    (Some(Literal::Int(n)), _) => Term::Int(n),
                    (Some(Literal::Bool(b)), _) => Term::Bool(b),
                    (None, Some(Sort::Bool)) => Term::Bool(false),
                    (None, _) => Term::Int(0),
                };
                let sym = encoder.symbol(&alias)?;
                encoder.assert(Term::eq(sym, value));
            }
            Ok((encoder, table))
        };
        let state = setup();

        class
            .invariants()
            .iter()
            .map(|inv| {
                let started = Instant::now();
                let formula = state.as_ref().map_err(Clone::clone).and_then(|(encoder, table)| {
                    let goal = encoder.encode_condition(clause_expr(inv)?, table)?;
                    let mut assertions = encoder.assertions().to_vec();
                    assertions.push(Term::not(goal));
                    Ok(Formula::new(assertions))
                });
                let (status, smt) = match formula {
                    Err(e) => (ObligationStatus::Inconclusive(InconclusiveReason::InternalFault(e.to_string())), None),
                    Ok(f) => {
                        let status = self.discharge(&f, &mapper, |cex| {
                            Violation::Invariant(InvariantViolation {
                                invariant: inv.clone(),
                                method: None,
                                counterexample: cex,
                            })
                        }, false);
                        (status, self.config.emit_smt.then(|| f.to_smtlib2()))
                    }
                };
                self.report(
                    ObligationKind::InvariantInitial,
                    None,
                    inv.text().to_string(),
                    inv.location(),
                    started,
                    status,
                    smt,
                )
            })
            .collect()
    }

    /// Queries the solver. For refutations a counterexample is a violation;
    /// when `expect_sat` is set an unsatisfiable formula is.
    fn discharge(
        &self,
        formula: &Formula,
        mapper: &CounterexampleMapper,
        violation: impl FnOnce(Option<Counterexample>) -> Violation,
        expect_sat: bool,
    ) -> ObligationStatus {
        match (self.solver.check(formula), expect_sat) {
            (Ok(CheckOutcome::Proved), false) => ObligationStatus::Proved,
            (Ok(CheckOutcome::Counterexample(model)), false) => {
                let cex = mapper.map(&model);
                ObligationStatus::Violated(violation((!cex.is_empty()).then_some(cex)))
            }
            (Ok(CheckOutcome::Counterexample(_)), true) => ObligationStatus::Proved,
            (Ok(CheckOutcome::Proved), true) => ObligationStatus::Violated(violation(None)),
            (Ok(CheckOutcome::Unknown(reason)), _) => {
                ObligationStatus::Inconclusive(InconclusiveReason::SolverUnknown(reason))
            }
            (Err(e), _) => inconclusive(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        kind: ObligationKind,
        method: Option<&MethodName>,
        subject: String,
        location: Location,
        started: Instant,
        status: ObligationStatus,
        smt: Option<String>,
    ) -> ObligationReport {
        let outcome = match &status {
            ObligationStatus::Proved => "proved",
            ObligationStatus::Violated(_) => "violated",
            ObligationStatus::Inconclusive(_) => "inconclusive",
        };
        debug!(
            kind = %kind,
            method = method.map(|m| m.as_str()).unwrap_or("<class>"),
            subject = %subject,
            outcome,
            "obligation"
        );
        ObligationReport {
            kind,
            method: method.cloned(),
            subject,
            location,
            duration_ms: duration_ms(started.elapsed()),
            status,
            smt,
        }
    }
}
