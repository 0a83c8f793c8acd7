#![forbid(unsafe_code)]

//! In-process solver that searches a bounded window of integer values.
//!
//! An assertion of the form `sym == rhs`, where `sym` has not appeared
//! before, defines `sym` instead of constraining it. Every other symbol is
//! free and enumerated over `0, 1, -1, 2, -2, ..` up to the radius, followed
//! by the neighbours of each integer literal in the query. A model is a
//! genuine counterexample. Running out of candidates only proves the query
//! when every free symbol is boolean and every candidate evaluated; an
//! integer search that comes up empty is `Unknown`. Overflow and division
//! by zero leave a candidate undetermined.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::solver::{CheckOutcome, Solver, SolverError};
use crate::term::{Formula, Model, Sort, Symbol, Term, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Val {
    I(i64),
    B(bool),
}

enum Step<'a> {
    Define(&'a Symbol, &'a Term),
    Require(&'a Term),
}

struct Plan<'a> {
    free: Vec<Symbol>,
    steps: Vec<Step<'a>>,
}

impl<'a> Plan<'a> {
    fn build(formula: &'a Formula) -> Self {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut free = Vec::new();
        let mut steps = Vec::new();

        let mut note = |t: &'a Term, seen: &mut HashSet<&'a str>| {
            let mut syms = Vec::new();
            t.collect_symbols(&mut syms);
            for s in syms {
                if seen.insert(s.name.as_str()) {
                    free.push(s.clone());
                }
            }
        };

        for a in &formula.assertions {
            if let Term::Eq(l, r) = a {
                if let Term::Var(s) = l.as_ref() {
                    if !seen.contains(s.name.as_str()) && !r.mentions(&s.name) {
                        note(r, &mut seen);
                        seen.insert(s.name.as_str());
                        steps.push(Step::Define(s, r));
                        continue;
                    }
                }
            }
            note(a, &mut seen);
            steps.push(Step::Require(a));
        }
        Self { free, steps }
    }
}

pub struct BoundedSolver {
    radius: i64,
    max_assignments: u64,
}

impl Default for BoundedSolver {
    fn default() -> Self {
        Self {
            radius: 8,
            max_assignments: 250_000,
        }
    }
}

impl BoundedSolver {
    pub fn new(radius: u32, max_assignments: u64) -> Self {
        Self {
            radius: i64::from(radius),
            max_assignments,
        }
    }

    fn domain(&self, sort: Sort, seeds: &[i64]) -> Vec<Val> {
        match sort {
            Sort::Bool => vec![Val::B(false), Val::B(true)],
            Sort::Int => {
                let mut out = vec![Val::I(0)];
                for k in 1..=self.radius {
                    out.push(Val::I(k));
                    out.push(Val::I(-k));
                }
                out.extend(seeds.iter().map(|&n| Val::I(n)));
                out
            }
        }
    }

    /// Literal neighbours `c - 1, c, c + 1, -c` that fall outside the window.
    fn seeds(&self, formula: &Formula) -> Vec<i64> {
        let mut literals = Vec::new();
        for a in &formula.assertions {
            collect_literals(a, &mut literals);
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for c in literals {
            let candidates = [c.checked_sub(1), Some(c), c.checked_add(1), c.checked_neg()];
            for n in candidates.into_iter().flatten() {
                if n.checked_abs().is_some_and(|m| m <= self.radius) {
                    continue;
                }
                if seen.insert(n) {
                    out.push(n);
                }
            }
        }
        out
    }
}

fn collect_literals(t: &Term, out: &mut Vec<i64>) {
    match t {
        Term::Int(n) => out.push(*n),
        Term::Bool(_) | Term::Var(_) => {}
        Term::Neg(a) | Term::Not(a) => collect_literals(a, out),
        Term::Add(a, b)
        | Term::Sub(a, b)
        | Term::Mul(a, b)
        | Term::Div(a, b)
        | Term::Implies(a, b)
        | Term::Eq(a, b)
        | Term::Lt(a, b)
        | Term::Le(a, b)
        | Term::Gt(a, b)
        | Term::Ge(a, b) => {
            collect_literals(a, out);
            collect_literals(b, out);
        }
        Term::And(parts) | Term::Or(parts) => {
            for p in parts {
                collect_literals(p, out);
            }
        }
        Term::Ite(c, x, y) => {
            collect_literals(c, out);
            collect_literals(x, out);
            collect_literals(y, out);
        }
    }
}

fn eval(t: &Term, env: &HashMap<&str, Val>) -> Option<Val> {
    let int = |t: &Term| match eval(t, env)? {
        Val::I(n) => Some(n),
        Val::B(_) => None,
    };
    let boolean = |t: &Term| match eval(t, env)? {
        Val::B(b) => Some(b),
        Val::I(_) => None,
    };
    Some(match t {
        Term::Int(n) => Val::I(*n),
        Term::Bool(b) => Val::B(*b),
        Term::Var(s) => *env.get(s.name.as_str())?,
        Term::Add(a, b) => Val::I(int(a)?.checked_add(int(b)?)?),
        Term::Sub(a, b) => Val::I(int(a)?.checked_sub(int(b)?)?),
        Term::Mul(a, b) => Val::I(int(a)?.checked_mul(int(b)?)?),
        Term::Div(a, b) => {
            let (a, b) = (int(a)?, int(b)?);
            // Division by zero is unconstrained in SMT-LIB; no single value stands for it.
            if b == 0 {
                return None;
            }
            Val::I(a.checked_div_euclid(b)?)
        }
        Term::Neg(a) => Val::I(int(a)?.checked_neg()?),
        Term::Not(a) => Val::B(!boolean(a)?),
        Term::And(parts) => {
            let mut all = true;
            for p in parts {
                all &= boolean(p)?;
            }
            Val::B(all)
        }
        Term::Or(parts) => {
            let mut any = false;
            for p in parts {
                any |= boolean(p)?;
            }
            Val::B(any)
        }
        Term::Implies(a, b) => Val::B(!boolean(a)? || boolean(b)?),
        Term::Eq(a, b) => Val::B(eval(a, env)? == eval(b, env)?),
        Term::Lt(a, b) => Val::B(int(a)? < int(b)?),
        Term::Le(a, b) => Val::B(int(a)? <= int(b)?),
        Term::Gt(a, b) => Val::B(int(a)? > int(b)?),
        Term::Ge(a, b) => Val::B(int(a)? >= int(b)?),
        Term::Ite(c, x, y) => {
            if boolean(c)? {
                eval(x, env)?
            } else {
                eval(y, env)?
            }
        }
    })
}

impl Solver for BoundedSolver {
    fn name(&self) -> &str {
        "bounded"
    }

    fn check(&self, formula: &Formula) -> Result<CheckOutcome, SolverError> {
        let plan = Plan::build(formula);
        let seeds = self.seeds(formula);
        let domains: Vec<Vec<Val>> = plan.free.iter().map(|s| self.domain(s.sort, &seeds)).collect();

        let total = domains
            .iter()
            .try_fold(1u64, |acc, d| acc.checked_mul(d.len() as u64));
        match total {
            Some(n) if n <= self.max_assignments => {}
            _ => {
                debug!(free = plan.free.len(), budget = self.max_assignments, "bounded search over budget");
                return Ok(CheckOutcome::Unknown(format!(
                    "{} free symbols exceed the search budget of {} assignments",
                    plan.free.len(),
                    self.max_assignments
                )));
            }
        }

        let mut undetermined = 0u64;
        let mut cursor = vec![0usize; domains.len()];
        'search: loop {
            let mut env: HashMap<&str, Val> = plan
                .free
                .iter()
                .zip(&cursor)
                .zip(&domains)
                .map(|((s, &i), d)| (s.name.as_str(), d[i]))
                .collect();

            let mut holds = true;
            for step in &plan.steps {
                match step {
                    Step::Define(s, rhs) => match eval(rhs, &env) {
                        Some(v) => {
                            env.insert(s.name.as_str(), v);
                        }
                        None => {
                            undetermined += 1;
                            holds = false;
                            break;
                        }
                    },
                    Step::Require(t) => match eval(t, &env) {
                        Some(Val::B(true)) => {}
                        Some(_) => {
                            holds = false;
                            break;
                        }
                        None => {
                            undetermined += 1;
                            holds = false;
                            break;
                        }
                    },
                }
            }

            if holds {
                let mut model = Model::default();
                for (name, v) in env {
                    let value = match v {
                        Val::I(n) => Value::Int(n),
                        Val::B(b) => Value::Bool(b),
                    };
                    model.insert(name, value);
                }
                return Ok(CheckOutcome::Counterexample(model));
            }

            for (slot, d) in cursor.iter_mut().zip(&domains) {
                *slot += 1;
                if *slot < d.len() {
                    continue 'search;
                }
                *slot = 0;
            }
            break;
        }

        if undetermined > 0 {
            debug!(undetermined, "bounded search hit overflow or division by zero");
            return Ok(CheckOutcome::Unknown(format!(
                "{undetermined} candidate assignments overflowed or divided by zero"
            )));
        }
        if plan.free.iter().all(|s| s.sort == Sort::Bool) {
            return Ok(CheckOutcome::Proved);
        }
        Ok(CheckOutcome::Unknown(format!("no model within radius {}", self.radius)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str) -> Term {
        Term::var(Symbol::new(name, Sort::Int))
    }

    #[test]
    fn finds_small_counterexample() {
        // x > 0 && !(x - 1 > 0)
        let f = Formula::new(vec![
            Term::gt(int("x"), Term::Int(0)),
            Term::not(Term::gt(Term::sub(int("x"), Term::Int(1)), Term::Int(0))),
        ]);
        match BoundedSolver::default().check(&f).expect("check") {
            CheckOutcome::Counterexample(m) => assert_eq!(m.get("x"), Some(&Value::Int(1))),
            other => panic!("expected counterexample, got {other:?}"),
        }
    }

    #[test]
    fn definitions_are_not_enumerated() {
        // y@1 is defined from x, so a window of radius 1 still finds x = 1.
        let f = Formula::new(vec![
            Term::eq(int("y@1"), Term::mul(int("x"), Term::Int(100))),
            Term::eq(int("y@1"), Term::Int(100)),
        ]);
        let solver = BoundedSolver::new(1, 10);
        match solver.check(&f).expect("check") {
            CheckOutcome::Counterexample(m) => {
                assert_eq!(m.get("x"), Some(&Value::Int(1)));
                assert_eq!(m.get("y@1"), Some(&Value::Int(100)));
            }
            other => panic!("expected counterexample, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_integer_window_is_unknown() {
        // x > 0 && !(x + 1 > 0) has no model at all, but the window cannot show that.
        let f = Formula::new(vec![
            Term::gt(int("x"), Term::Int(0)),
            Term::not(Term::gt(Term::add(int("x"), Term::Int(1)), Term::Int(0))),
        ]);
        match BoundedSolver::default().check(&f).expect("check") {
            CheckOutcome::Unknown(reason) => assert_eq!(reason, "no model within radius 8"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn model_just_outside_window_is_unknown_not_proved() {
        // x * x == 169 only holds at 13 and -13, past radius 8 and not seeded by the literal.
        let f = Formula::new(vec![Term::eq(Term::mul(int("x"), int("x")), Term::Int(169))]);
        assert!(matches!(BoundedSolver::default().check(&f).expect("check"), CheckOutcome::Unknown(_)));
    }

    #[test]
    fn literals_seed_the_window() {
        // x > 100 is only satisfiable past the radius; the literal brings 101 in.
        let f = Formula::new(vec![Term::gt(int("x"), Term::Int(100))]);
        match BoundedSolver::default().check(&f).expect("check") {
            CheckOutcome::Counterexample(m) => assert_eq!(m.get("x"), Some(&Value::Int(101))),
            other => panic!("expected counterexample, got {other:?}"),
        }

        let f = Formula::new(vec![Term::eq(int("x"), Term::Int(-9))]);
        let solver = BoundedSolver::new(2, 100);
        match solver.check(&f).expect("check") {
            CheckOutcome::Counterexample(m) => assert_eq!(m.get("x"), Some(&Value::Int(-9))),
            other => panic!("expected counterexample, got {other:?}"),
        }
    }

    #[test]
    fn window_edge_is_searched() {
        let f = Formula::new(vec![Term::eq(Term::mul(int("x"), int("x")), Term::Int(64))]);
        match BoundedSolver::default().check(&f).expect("check") {
            CheckOutcome::Counterexample(m) => assert_eq!(m.get("x"), Some(&Value::Int(8))),
            other => panic!("expected counterexample, got {other:?}"),
        }
        // One step past the edge is out of reach.
        let f = Formula::new(vec![Term::eq(Term::mul(int("x"), int("x")), Term::Int(81))]);
        assert!(matches!(BoundedSolver::default().check(&f).expect("check"), CheckOutcome::Unknown(_)));
    }

    #[test]
    fn closed_and_boolean_queries_are_decided() {
        let closed = Formula::new(vec![
            Term::eq(int("x@1"), Term::Int(5)),
            Term::not(Term::eq(int("x@1"), Term::Int(5))),
        ]);
        assert_eq!(BoundedSolver::default().check(&closed).expect("check"), CheckOutcome::Proved);

        let b = Term::var(Symbol::new("b", Sort::Bool));
        let contradiction = Formula::new(vec![b.clone(), Term::not(b)]);
        assert_eq!(BoundedSolver::default().check(&contradiction).expect("check"), CheckOutcome::Proved);
    }

    #[test]
    fn overflow_in_a_definition_is_unknown() {
        // y@1 == x * i64::MAX overflows outside -1..=1, and y@1 == 5 fails inside it.
        let f = Formula::new(vec![
            Term::eq(int("y@1"), Term::mul(int("x"), Term::Int(i64::MAX))),
            Term::eq(int("y@1"), Term::Int(5)),
        ]);
        let solver = BoundedSolver::new(1, 100);
        match solver.check(&f).expect("check") {
            CheckOutcome::Unknown(reason) => assert!(reason.contains("overflowed"), "{reason}"),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn closed_division_by_zero_is_unknown() {
        let f = Formula::new(vec![Term::eq(Term::div(Term::Int(7), Term::Int(0)), Term::Int(3))]);
        assert!(matches!(BoundedSolver::default().check(&f).expect("check"), CheckOutcome::Unknown(_)));
    }

    #[test]
    fn oversized_search_is_unknown() {
        let f = Formula::new(vec![Term::eq(
            Term::add(int("a"), int("b")),
            Term::add(int("c"), int("d")),
        )]);
        let solver = BoundedSolver::new(8, 1000);
        assert!(matches!(solver.check(&f).expect("check"), CheckOutcome::Unknown(_)));
    }

    #[test]
    fn division_rounds_toward_negative_infinity_for_positive_divisors() {
        let env = HashMap::new();
        assert_eq!(eval(&Term::div(Term::Int(-7), Term::Int(2)), &env), Some(Val::I(-4)));
        assert_eq!(eval(&Term::div(Term::Int(7), Term::Int(-2)), &env), Some(Val::I(-3)));
        assert_eq!(eval(&Term::div(Term::Int(7), Term::Int(0)), &env), None);
    }
}
