#![forbid(unsafe_code)]

//! Solver-neutral term algebra.
//!
//! The encoder produces `Term`s; each solver backend translates them into
//! its own representation. `Display` renders SMT-LIB2.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    Int,
    Bool,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => f.write_str("Int"),
            Sort::Bool => f.write_str("Bool"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub sort: Sort,
}

impl Symbol {
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Int(i64),
    Bool(bool),
    Var(Symbol),

    Add(Box<Term>, Box<Term>),
    Sub(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
    /// Integer division with SMT-LIB `div` semantics.
    Div(Box<Term>, Box<Term>),
    Neg(Box<Term>),

    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),

    Eq(Box<Term>, Box<Term>),
    Lt(Box<Term>, Box<Term>),
    Le(Box<Term>, Box<Term>),
    Gt(Box<Term>, Box<Term>),
    Ge(Box<Term>, Box<Term>),

    Ite(Box<Term>, Box<Term>, Box<Term>),
}

impl Term {
    pub fn var(symbol: Symbol) -> Self {
        Term::Var(symbol)
    }

    pub fn add(a: Term, b: Term) -> Self {
        Term::Add(Box::new(a), Box::new(b))
    }

    pub fn sub(a: Term, b: Term) -> Self {
        Term::Sub(Box::new(a), Box::new(b))
    }

    pub fn mul(a: Term, b: Term) -> Self {
        Term::Mul(Box::new(a), Box::new(b))
    }

    pub fn div(a: Term, b: Term) -> Self {
        Term::Div(Box::new(a), Box::new(b))
    }

    pub fn neg(a: Term) -> Self {
        Term::Neg(Box::new(a))
    }

    pub fn not(a: Term) -> Self {
        Term::Not(Box::new(a))
    }

    pub fn and(parts: Vec<Term>) -> Self {
        Term::And(parts)
    }

    pub fn or(parts: Vec<Term>) -> Self {
        Term::Or(parts)
    }

    pub fn implies(a: Term, b: Term) -> Self {
        Term::Implies(Box::new(a), Box::new(b))
    }

    pub fn eq(a: Term, b: Term) -> Self {
        Term::Eq(Box::new(a), Box::new(b))
    }

    pub fn lt(a: Term, b: Term) -> Self {
        Term::Lt(Box::new(a), Box::new(b))
    }

    pub fn le(a: Term, b: Term) -> Self {
        Term::Le(Box::new(a), Box::new(b))
    }

    pub fn gt(a: Term, b: Term) -> Self {
        Term::Gt(Box::new(a), Box::new(b))
    }

    pub fn ge(a: Term, b: Term) -> Self {
        Term::Ge(Box::new(a), Box::new(b))
    }

    pub fn ite(c: Term, t: Term, e: Term) -> Self {
        Term::Ite(Box::new(c), Box::new(t), Box::new(e))
    }

    /// Sort of a well-sorted term.
    pub fn sort(&self) -> Sort {
        match self {
            Term::Int(_)
            | Term::Add(..)
            | Term::Sub(..)
            | Term::Mul(..)
            | Term::Div(..)
            | Term::Neg(_) => Sort::Int,
            Term::Bool(_)
            | Term::Not(_)
            | Term::And(_)
            | Term::Or(_)
            | Term::Implies(..)
            | Term::Eq(..)
            | Term::Lt(..)
            | Term::Le(..)
            | Term::Gt(..)
            | Term::Ge(..) => Sort::Bool,
            Term::Var(s) => s.sort,
            Term::Ite(_, t, _) => t.sort(),
        }
    }

    pub fn collect_symbols<'a>(&'a self, out: &mut Vec<&'a Symbol>) {
        match self {
            Term::Int(_) | Term::Bool(_) => {}
            Term::Var(s) => out.push(s),
            Term::Neg(a) | Term::Not(a) => a.collect_symbols(out),
            Term::And(parts) | Term::Or(parts) => {
                for p in parts {
                    p.collect_symbols(out);
                }
            }
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
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Term::Ite(c, t, e) => {
                c.collect_symbols(out);
                t.collect_symbols(out);
                e.collect_symbols(out);
            }
        }
    }

    pub fn mentions(&self, name: &str) -> bool {
        let mut syms = Vec::new();
        self.collect_symbols(&mut syms);
        syms.iter().any(|s| s.name == name)
    }
}

fn quote_symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

fn write_app(f: &mut fmt::Formatter<'_>, head: &str, args: &[&Term]) -> fmt::Result {
    write!(f, "({head}")?;
    for a in args {
        write!(f, " {a}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Int(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            Term::Int(n) => write!(f, "{n}"),
            Term::Bool(b) => write!(f, "{b}"),
            Term::Var(s) => f.write_str(&quote_symbol(&s.name)),
            Term::Add(a, b) => write_app(f, "+", &[a, b]),
            Term::Sub(a, b) => write_app(f, "-", &[a, b]),
            Term::Mul(a, b) => write_app(f, "*", &[a, b]),
            Term::Div(a, b) => write_app(f, "div", &[a, b]),
            Term::Neg(a) => write_app(f, "-", &[a]),
            Term::Not(a) => write_app(f, "not", &[a]),
            Term::And(parts) if parts.is_empty() => f.write_str("true"),
            Term::Or(parts) if parts.is_empty() => f.write_str("false"),
            Term::And(parts) => write_app(f, "and", &parts.iter().collect::<Vec<_>>()),
            Term::Or(parts) => write_app(f, "or", &parts.iter().collect::<Vec<_>>()),
            Term::Implies(a, b) => write_app(f, "=>", &[a, b]),
            Term::Eq(a, b) => write_app(f, "=", &[a, b]),
            Term::Lt(a, b) => write_app(f, "<", &[a, b]),
            Term::Le(a, b) => write_app(f, "<=", &[a, b]),
            Term::Gt(a, b) => write_app(f, ">", &[a, b]),
            Term::Ge(a, b) => write_app(f, ">=", &[a, b]),
            Term::Ite(c, t, e) => write_app(f, "ite", &[c, t, e]),
        }
    }
}

/// Conjunction of assertions submitted to a solver in one query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub assertions: Vec<Term>,
}

impl Formula {
    pub fn new(assertions: Vec<Term>) -> Self {
        Self { assertions }
    }

    pub fn push(&mut self, t: Term) {
        self.assertions.push(t);
    }

    /// Every symbol in the formula, in first-occurrence order.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for a in &self.assertions {
            let mut syms = Vec::new();
            a.collect_symbols(&mut syms);
            for s in syms {
                if seen.insert(s.name.as_str()) {
                    out.push(s.clone());
                }
            }
        }
        out
    }

    pub fn to_smtlib2(&self) -> String {
        let mut out = String::new();
        for s in self.symbols() {
            out.push_str(&format!("(declare-fun {} () {})\n", quote_symbol(&s.name), s.sort));
        }
        for a in &self.assertions {
            out.push_str(&format!("(assert {a})\n"));
        }
        out.push_str("(check-sat)\n");
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Bool(bool),
    /// Value the backend could not express as a machine integer or bool.
    Other(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Other(s) => f.write_str(s),
        }
    }
}

/// Satisfying assignment returned by a solver, keyed by symbol name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub assignments: BTreeMap<String, Value>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.assignments.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.assignments.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_smtlib2() {
        let x = Symbol::new("x@0", Sort::Int);
        let f = Formula::new(vec![
            Term::gt(Term::var(x.clone()), Term::Int(0)),
            Term::not(Term::gt(Term::sub(Term::var(x), Term::Int(1)), Term::Int(-1))),
        ]);
        assert_eq!(
            f.to_smtlib2(),
            "(declare-fun x@0 () Int)\n(assert (> x@0 0))\n(assert (not (> (- x@0 1) (- 1))))\n(check-sat)\n"
        );
    }

    #[test]
    fn quotes_symbols_outside_the_simple_alphabet() {
        assert_eq!(quote_symbol("this.count@2"), "this.count@2");
        assert_eq!(quote_symbol("odd name"), "|odd name|");
        assert_eq!(quote_symbol("1st"), "|1st|");
    }

    #[test]
    fn ite_takes_the_sort_of_its_branches() {
        let c = Term::var(Symbol::new("c", Sort::Bool));
        let t = Term::ite(c, Term::Int(1), Term::Int(2));
        assert_eq!(t.sort(), Sort::Int);
        assert!(t.mentions("c"));
        assert!(!t.mentions("d"));
    }
}
