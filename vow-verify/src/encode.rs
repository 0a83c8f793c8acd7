#![forbid(unsafe_code)]

//! Encodes model expressions and statements into solver terms.

use std::collections::BTreeMap;

use thiserror::Error;
use vow_model::{
    ArithmeticOp, ComparisonOp, Expression, ExpressionType, Literal, Location, LogicalOp, Statement,
    UnaryOp,
};

use crate::alias::{AliasError, AliasName, AliasTable};
use crate::term::{Sort, Symbol, Term};

/// Ghost variable holding the method's return value.
pub const RESULT_NAME: &str = "$result";
/// Ghost flag set once a `return` has executed on the current path.
pub const RETURNED_NAME: &str = "$returned";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error("unsupported construct at {0} reached the encoder")]
    UnsupportedReached(Location),
    #[error("`{name}` has type `{ty}`, which has no solver sort")]
    Unsorted { name: String, ty: String },
    #[error("`{op}` expects {expected} operands, found {found}")]
    SortMismatch {
        op: String,
        expected: Sort,
        found: Sort,
    },
    #[error("`result` used in a method that returns no value")]
    NoResult,
}

/// Maps a model type onto a solver sort.
pub fn sort_of(ty: &ExpressionType) -> Option<Sort> {
    if ty.is_integral() {
        Some(Sort::Int)
    } else if ty.is_boolean() {
        Some(Sort::Bool)
    } else {
        None
    }
}

/// How a binary model operator becomes a term.
pub trait TermRule {
    fn symbol(&self) -> &'static str;
    fn operand_sort(&self) -> Option<Sort>;
    fn build(&self, left: Term, right: Term) -> Term;
}

impl TermRule for ArithmeticOp {
    fn symbol(&self) -> &'static str {
        ArithmeticOp::symbol(*self)
    }

    fn operand_sort(&self) -> Option<Sort> {
        Some(Sort::Int)
    }

    fn build(&self, l: Term, r: Term) -> Term {
        match self {
            ArithmeticOp::Add => Term::add(l, r),
            ArithmeticOp::Sub => Term::sub(l, r),
            ArithmeticOp::Mul => Term::mul(l, r),
            ArithmeticOp::Div => Term::div(l, r),
        }
    }
}

impl TermRule for LogicalOp {
    fn symbol(&self) -> &'static str {
        LogicalOp::symbol(*self)
    }

    fn operand_sort(&self) -> Option<Sort> {
        Some(Sort::Bool)
    }

    fn build(&self, l: Term, r: Term) -> Term {
        match self {
            LogicalOp::And => Term::and(vec![l, r]),
            LogicalOp::Or => Term::or(vec![l, r]),
        }
    }
}

impl TermRule for ComparisonOp {
    fn symbol(&self) -> &'static str {
        ComparisonOp::symbol(*self)
    }

    /// Equality compares either sort; ordering needs integers.
    fn operand_sort(&self) -> Option<Sort> {
        match self {
            ComparisonOp::Eq | ComparisonOp::Ne => None,
            _ => Some(Sort::Int),
        }
    }

    fn build(&self, l: Term, r: Term) -> Term {
        match self {
            ComparisonOp::Eq => Term::eq(l, r),
            ComparisonOp::Ne => Term::not(Term::eq(l, r)),
            ComparisonOp::Gt => Term::gt(l, r),
            ComparisonOp::Ge => Term::ge(l, r),
            ComparisonOp::Lt => Term::lt(l, r),
            ComparisonOp::Le => Term::le(l, r),
        }
    }
}

fn expect_sort(op: &str, expected: Sort, t: &Term) -> Result<(), EncodeError> {
    let found = t.sort();
    if found != expected {
        return Err(EncodeError::SortMismatch {
            op: op.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Whether a `return` may already have run on the path being encoded.
#[derive(Clone, Copy, Debug, Default)]
struct Flow {
    may_have_returned: bool,
}

/// Accumulates the assertions describing one method's execution.
///
/// Variables are declared once with their sort; each read resolves through
/// an `AliasTable`, each write issues a fresh alias and asserts its value.
#[derive(Debug, Default)]
pub struct Encoder {
    sorts: BTreeMap<String, Sort>,
    assertions: Vec<Term>,
    has_result: bool,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` in `table` at generation 0 with the sort of `ty`.
    pub fn declare(
        &mut self,
        table: &mut AliasTable,
        name: &str,
        ty: &ExpressionType,
    ) -> Result<AliasName, EncodeError> {
        let sort = sort_of(ty).ok_or_else(|| EncodeError::Unsorted {
            name: name.to_string(),
            ty: ty.to_string(),
        })?;
        self.declare_sorted(table, name, sort)
    }

    fn declare_sorted(&mut self, table: &mut AliasTable, name: &str, sort: Sort) -> Result<AliasName, EncodeError> {
        let alias = table.add_name(name)?;
        self.sorts.insert(name.to_string(), sort);
        Ok(alias)
    }

    /// Declares the return ghosts and pins `$returned` to false on entry.
    pub fn begin_body(&mut self, table: &mut AliasTable, return_type: &ExpressionType) -> Result<(), EncodeError> {
        let returned = self.declare_sorted(table, RETURNED_NAME, Sort::Bool)?;
        let returned = self.symbol(&returned)?;
        self.assertions.push(Term::eq(returned, Term::Bool(false)));
        if !return_type.is_void() {
            self.declare(table, RESULT_NAME, return_type)?;
            self.has_result = true;
        }
        Ok(())
    }

    pub fn sort(&self, name: &str) -> Option<Sort> {
        self.sorts.get(name).copied()
    }

    pub fn symbol(&self, alias: &AliasName) -> Result<Term, EncodeError> {
        let sort = self
            .sort(alias.base())
            .ok_or_else(|| AliasError::Unregistered(alias.base().to_string()))?;
        Ok(Term::var(Symbol::new(alias.to_string(), sort)))
    }

    fn current(&self, table: &AliasTable, name: &str) -> Result<Term, EncodeError> {
        self.symbol(&table.get_alias(name)?)
    }

    pub fn assert(&mut self, t: Term) {
        self.assertions.push(t);
    }

    pub fn assertions(&self) -> &[Term] {
        &self.assertions
    }

    pub fn take_assertions(&mut self) -> Vec<Term> {
        std::mem::take(&mut self.assertions)
    }

    /// Translates `expr` under the generations current in `table`.
    pub fn encode_expr(&self, expr: &Expression, table: &AliasTable) -> Result<Term, EncodeError> {
        match expr {
            Expression::Literal(Literal::Int(n)) => Ok(Term::Int(*n)),
            Expression::Literal(Literal::Bool(b)) => Ok(Term::Bool(*b)),
            Expression::VariableRef(v) => self.current(table, &v.logical_name()),
            Expression::BinaryArithmetic { op, left, right } => self.encode_binary(op, left, right, table),
            Expression::BinaryLogical { op, left, right } => self.encode_binary(op, left, right, table),
            Expression::Comparison { op, left, right } => self.encode_binary(op, left, right, table),
            Expression::Unary { op, operand } => {
                let inner = self.encode_expr(operand, table)?;
                match op {
                    UnaryOp::Not => {
                        expect_sort(op.symbol(), Sort::Bool, &inner)?;
                        Ok(Term::not(inner))
                    }
                    UnaryOp::Negate => {
                        expect_sort(op.symbol(), Sort::Int, &inner)?;
                        Ok(Term::neg(inner))
                    }
                }
            }
            Expression::Parenthesized(inner) => self.encode_expr(inner, table),
            Expression::Result => {
                if !self.has_result {
                    return Err(EncodeError::NoResult);
                }
                self.current(table, RESULT_NAME)
            }
            Expression::Unsupported(loc) => Err(EncodeError::UnsupportedReached(*loc)),
        }
    }

    /// Encodes a clause body, which must be boolean.
    pub fn encode_condition(&self, expr: &Expression, table: &AliasTable) -> Result<Term, EncodeError> {
        let t = self.encode_expr(expr, table)?;
        expect_sort("condition", Sort::Bool, &t)?;
        Ok(t)
    }

    fn encode_binary(
        &self,
        op: &dyn TermRule,
        left: &Expression,
        right: &Expression,
        table: &AliasTable,
    ) -> Result<Term, EncodeError> {
        let l = self.encode_expr(left, table)?;
        let r = self.encode_expr(right, table)?;
        let expected = op.operand_sort().unwrap_or_else(|| l.sort());
        expect_sort(op.symbol(), expected, &l)?;
        expect_sort(op.symbol(), expected, &r)?;
        Ok(op.build(l, r))
    }

    /// Encodes a method body, advancing `table` to the exit state.
    pub fn encode_body(&mut self, body: &[Statement], table: &mut AliasTable) -> Result<(), EncodeError> {
        let mut flow = Flow::default();
        self.encode_block(body, table, &mut flow)
    }

    fn encode_block(&mut self, block: &[Statement], table: &mut AliasTable, flow: &mut Flow) -> Result<(), EncodeError> {
        for stmt in block {
            self.encode_statement(stmt, table, flow)?;
        }
        Ok(())
    }

    fn encode_statement(&mut self, stmt: &Statement, table: &mut AliasTable, flow: &mut Flow) -> Result<(), EncodeError> {
        match stmt {
            Statement::Assignment { destination, expr, .. } => {
                let value = self.encode_expr(expr, table)?;
                let name = destination.logical_name();
                let sort = self
                    .sort(&name)
                    .ok_or_else(|| AliasError::Unregistered(name.clone()))?;
                expect_sort("=", sort, &value)?;
                self.write(table, &name, value, *flow)
            }
            Statement::Conditional {
                condition,
                then_block,
                else_block,
                ..
            } => {
                let cond = self.encode_condition(condition, table)?;

                let mut then_table = table.clone();
                let mut then_flow = *flow;
                self.encode_block(then_block, &mut then_table, &mut then_flow)?;

                let mut else_table = table.clone();
                let mut else_flow = *flow;
                self.encode_block(else_block, &mut else_table, &mut else_flow)?;

                let merged = AliasTable::merge(then_table, else_table)?;
                *table = merged.table;
                for d in merged.divergences {
                    let joined = table.increment_name_alias(&d.name)?;
                    let joined = self.symbol(&joined)?;
                    let then_value = self.symbol(&d.left)?;
                    let else_value = self.symbol(&d.right)?;
                    self.assertions
                        .push(Term::eq(joined, Term::ite(cond.clone(), then_value, else_value)));
                }
                flow.may_have_returned = then_flow.may_have_returned || else_flow.may_have_returned;
                Ok(())
            }
            Statement::Return { expr, .. } => {
                if let Some(e) = expr {
                    if !self.has_result {
                        return Err(EncodeError::NoResult);
                    }
                    let value = self.encode_expr(e, table)?;
                    let sort = self.sort(RESULT_NAME).unwrap_or(Sort::Int);
                    expect_sort("return", sort, &value)?;
                    self.write(table, RESULT_NAME, value, *flow)?;
                }
                self.write(table, RETURNED_NAME, Term::Bool(true), *flow)?;
                flow.may_have_returned = true;
                Ok(())
            }
            Statement::Unsupported(loc) => Err(EncodeError::UnsupportedReached(*loc)),
        }
    }

    /// Binds a fresh alias of `name` to `value`. After a possible return the
    /// old value is kept on paths that already returned.
    fn write(&mut self, table: &mut AliasTable, name: &str, value: Term, flow: Flow) -> Result<(), EncodeError> {
        let rhs = if flow.may_have_returned {
            let returned = self.current(table, RETURNED_NAME)?;
            let old = self.current(table, name)?;
            Term::ite(returned, old, value)
        } else {
            value
        };
        let fresh = table.increment_name_alias(name)?;
        let fresh = self.symbol(&fresh)?;
        self.assertions.push(Term::eq(fresh, rhs));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vow_model::{Parameter, ParameterName, Variable};

    fn param(name: &str) -> Variable {
        Variable::Parameter(Parameter {
            name: ParameterName::new(name),
            ty: ExpressionType::int(),
            location: Location::default(),
        })
    }

    fn setup(names: &[&str]) -> (Encoder, AliasTable) {
        let mut enc = Encoder::new();
        let mut table = AliasTable::new();
        for n in names {
            enc.declare(&mut table, n, &ExpressionType::int()).expect("declare");
        }
        (enc, table)
    }

    #[test]
    fn expression_reads_current_generation() {
        let (enc, mut table) = setup(&["x"]);
        table.increment_name_alias("x").expect("inc");
        let e = Expression::compare(ComparisonOp::Gt, Expression::var(param("x")), Expression::int(0));
        assert_eq!(enc.encode_expr(&e, &table).expect("encode").to_string(), "(> x@1 0)");
    }

    #[test]
    fn assignment_issues_fresh_alias() {
        let (mut enc, mut table) = setup(&["x"]);
        let body = vec![Statement::assign(
            param("x"),
            Expression::arith(ArithmeticOp::Add, Expression::var(param("x")), Expression::int(1)),
        )];
        enc.encode_body(&body, &mut table).expect("encode");
        let rendered: Vec<String> = enc.assertions().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["(= x@1 (+ x@0 1))"]);
        assert_eq!(table.get_alias("x").expect("get").to_string(), "x@1");
    }

    #[test]
    fn conditional_joins_divergent_names() {
        let (mut enc, mut table) = setup(&["x", "y"]);
        let body = vec![Statement::conditional(
            Expression::compare(ComparisonOp::Gt, Expression::var(param("y")), Expression::int(0)),
            vec![Statement::assign(param("x"), Expression::int(1))],
            vec![],
        )];
        enc.encode_body(&body, &mut table).expect("encode");
        let rendered: Vec<String> = enc.assertions().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["(= x@1 1)", "(= x@2 (ite (> y@0 0) x@1 x@0))"]
        );
        assert_eq!(table.get_alias("y").expect("get").generation(), 0);
    }

    #[test]
    fn writes_after_a_return_are_guarded() {
        let mut enc = Encoder::new();
        let mut table = AliasTable::new();
        enc.declare(&mut table, "x", &ExpressionType::int()).expect("declare");
        enc.begin_body(&mut table, &ExpressionType::int()).expect("ghosts");
        let body = vec![
            Statement::conditional(
                Expression::compare(ComparisonOp::Lt, Expression::var(param("x")), Expression::int(0)),
                vec![Statement::ret(Some(Expression::int(0)))],
                vec![],
            ),
            Statement::ret(Some(Expression::var(param("x")))),
        ];
        enc.encode_body(&body, &mut table).expect("encode");
        let rendered: Vec<String> = enc.assertions().iter().map(ToString::to_string).collect();
        assert_eq!(rendered[0], "(= $returned@0 false)");
        assert!(rendered.contains(&"(= $result@2 (ite (< x@0 0) $result@1 $result@0))".to_string()));
        assert!(rendered.contains(&"(= $result@3 (ite $returned@2 $result@2 x@0))".to_string()));
    }

    #[test]
    fn reaching_unsupported_is_an_error() {
        let (enc, table) = setup(&[]);
        let loc = Location::new(4, 2);
        assert_eq!(
            enc.encode_expr(&Expression::Unsupported(loc), &table),
            Err(EncodeError::UnsupportedReached(loc))
        );
    }

    #[test]
    fn operand_sorts_are_checked() {
        let (enc, table) = setup(&[]);
        let e = Expression::logical(LogicalOp::And, Expression::int(1), Expression::bool(true));
        assert!(matches!(
            enc.encode_expr(&e, &table),
            Err(EncodeError::SortMismatch { expected: Sort::Bool, found: Sort::Int, .. })
        ));
    }

    #[test]
    fn result_outside_a_valued_method_is_refused() {
        let mut enc = Encoder::new();
        let mut table = AliasTable::new();
        enc.begin_body(&mut table, &ExpressionType::void()).expect("ghosts");
        assert_eq!(enc.encode_expr(&Expression::Result, &table), Err(EncodeError::NoResult));
    }
}
