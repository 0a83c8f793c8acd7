#![forbid(unsafe_code)]

//! Class model consumed by the verifier.
//!
//! The model is produced and sealed by a front-end; nothing in this crate
//! mutates it after construction. Every entity that may fall outside the
//! supported subset has an explicit `Unsupported` arm, and the derived
//! `is_supported` flags let callers refuse a class as a whole.

use std::fmt;

use miette::SourceSpan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod table;

pub use table::{NameTable, Named, TableError, TableKey};

pub type Span = SourceSpan;

/// Source position of a model element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub len: usize,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            offset: 0,
            len: 0,
        }
    }

    pub fn with_span(mut self, offset: usize, len: usize) -> Self {
        self.offset = offset;
        self.len = len;
        self
    }

    pub fn span(&self) -> Span {
        SourceSpan::new(self.offset.into(), self.len)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

macro_rules! identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(text: impl Into<String>) -> Self {
                Self(text.into())
            }

            pub fn unresolved() -> Self {
                Self(UNRESOLVED_NAME.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TableKey for $name {
            fn is_unresolved(&self) -> bool {
                self.0 == UNRESOLVED_NAME
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

/// Sentinel text carried by identifiers the front-end could not resolve.
pub const UNRESOLVED_NAME: &str = "<unresolved>";

identifier!(ClassName);
identifier!(FieldName);
identifier!(MethodName);
identifier!(ParameterName);
identifier!(
    /// Name of an auto-property backed by a field.
    PropertyName
);
identifier!(LocalName);

// Unsigned types are left out: their range is not modelled, so they fail closed.
const INTEGRAL_TYPES: &[&str] = &[
    "int", "long", "short", "sbyte", "Int32", "Int64", "Int16", "SByte", "System.Int32",
    "System.Int64", "System.Int16", "System.SByte",
];

const BOOLEAN_TYPES: &[&str] = &["bool", "Boolean", "System.Boolean"];

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    Named { name: String, nullable: bool },
    /// Type unknown or outside the supported subset.
    Other,
}

impl ExpressionType {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            nullable: false,
        }
    }

    pub fn int() -> Self {
        Self::named("int")
    }

    pub fn bool() -> Self {
        Self::named("bool")
    }

    pub fn void() -> Self {
        Self::named("void")
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Named { name, nullable: false } if INTEGRAL_TYPES.contains(&name.as_str()))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Named { name, nullable: false } if BOOLEAN_TYPES.contains(&name.as_str()))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Named { name, .. } if name == "void")
    }

    /// True when values of this type map onto an integer or boolean sort.
    pub fn is_verifiable(&self) -> bool {
        self.is_integral() || self.is_boolean()
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, nullable: true } => write!(f, "{name}?"),
            Self::Named { name, .. } => f.write_str(name),
            Self::Other => f.write_str("<other>"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: FieldName,
    pub ty: ExpressionType,
    #[serde(default)]
    pub initializer: Option<Literal>,
    pub owner: ClassName,
    /// Set when the field is the backing store of an auto-property.
    #[serde(default)]
    pub property: Option<PropertyName>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: ParameterName,
    pub ty: ExpressionType,
    #[serde(default)]
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub name: LocalName,
    pub ty: ExpressionType,
    #[serde(default)]
    pub location: Location,
}

impl Named for Field {
    type Name = FieldName;

    fn name(&self) -> &FieldName {
        &self.name
    }
}

impl Named for Parameter {
    type Name = ParameterName;

    fn name(&self) -> &ParameterName {
        &self.name
    }
}

impl Named for Local {
    type Name = LocalName;

    fn name(&self) -> &LocalName {
        &self.name
    }
}

/// A variable read or written by a method, tagged by its role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Field(Field),
    Parameter(Parameter),
    Local(Local),
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Field(f) => f.name.as_str(),
            Variable::Parameter(p) => p.name.as_str(),
            Variable::Local(l) => l.name.as_str(),
        }
    }

    pub fn ty(&self) -> &ExpressionType {
        match self {
            Variable::Field(f) => &f.ty,
            Variable::Parameter(p) => &p.ty,
            Variable::Local(l) => &l.ty,
        }
    }

    /// Method-unique name; fields live under `this.` so they never collide
    /// with a parameter or local of the same spelling.
    pub fn logical_name(&self) -> String {
        match self {
            Variable::Field(f) => field_logical_name(&f.name),
            Variable::Parameter(p) => p.name.to_string(),
            Variable::Local(l) => l.name.to_string(),
        }
    }
}

pub fn field_logical_name(name: &FieldName) -> String {
    format!("this.{name}")
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Field(fd) => write!(f, "this.{}", fd.name),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl LogicalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl ComparisonOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "-")]
    Negate,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Negate => "-",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Literal),
    VariableRef(Variable),
    BinaryArithmetic {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    BinaryLogical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Parenthesized(Box<Expression>),
    /// The method's return value; only meaningful inside an ensure clause.
    Result,
    Unsupported(Location),
}

impl Expression {
    pub fn int(n: i64) -> Self {
        Self::Literal(Literal::Int(n))
    }

    pub fn bool(b: bool) -> Self {
        Self::Literal(Literal::Bool(b))
    }

    pub fn var(v: Variable) -> Self {
        Self::VariableRef(v)
    }

    pub fn arith(op: ArithmeticOp, left: Expression, right: Expression) -> Self {
        Self::BinaryArithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, left: Expression, right: Expression) -> Self {
        Self::BinaryLogical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Self::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn paren(inner: Expression) -> Self {
        Self::Parenthesized(Box::new(inner))
    }

    pub fn is_supported(&self) -> bool {
        self.first_unsupported().is_none()
    }

    pub fn first_unsupported(&self) -> Option<Location> {
        match self {
            Expression::Literal(_) | Expression::VariableRef(_) | Expression::Result => None,
            Expression::BinaryArithmetic { left, right, .. }
            | Expression::BinaryLogical { left, right, .. }
            | Expression::Comparison { left, right, .. } => {
                left.first_unsupported().or_else(|| right.first_unsupported())
            }
            Expression::Unary { operand, .. } => operand.first_unsupported(),
            Expression::Parenthesized(inner) => inner.first_unsupported(),
            Expression::Unsupported(loc) => Some(*loc),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(l) => write!(f, "{l}"),
            Expression::VariableRef(v) => write!(f, "{v}"),
            Expression::BinaryArithmetic { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expression::BinaryLogical { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expression::Comparison { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expression::Unary { op, operand } => write!(f, "{}{operand}", op.symbol()),
            Expression::Parenthesized(inner) => write!(f, "({inner})"),
            Expression::Result => f.write_str("result"),
            Expression::Unsupported(loc) => write!(f, "<unsupported at {loc}>"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Assignment {
        destination: Variable,
        expr: Expression,
        #[serde(default)]
        location: Location,
    },
    Conditional {
        condition: Expression,
        then_block: Vec<Statement>,
        #[serde(default)]
        else_block: Vec<Statement>,
        #[serde(default)]
        location: Location,
    },
    Return {
        #[serde(default)]
        expr: Option<Expression>,
        #[serde(default)]
        location: Location,
    },
    Unsupported(Location),
}

impl Statement {
    pub fn assign(destination: Variable, expr: Expression) -> Self {
        Self::Assignment {
            destination,
            expr,
            location: Location::default(),
        }
    }

    pub fn conditional(condition: Expression, then_block: Vec<Statement>, else_block: Vec<Statement>) -> Self {
        Self::Conditional {
            condition,
            then_block,
            else_block,
            location: Location::default(),
        }
    }

    pub fn ret(expr: Option<Expression>) -> Self {
        Self::Return {
            expr,
            location: Location::default(),
        }
    }

    pub fn first_unsupported(&self) -> Option<Location> {
        match self {
            Statement::Assignment { expr, .. } => expr.first_unsupported(),
            Statement::Conditional {
                condition,
                then_block,
                else_block,
                ..
            } => condition
                .first_unsupported()
                .or_else(|| first_unsupported_in(then_block))
                .or_else(|| first_unsupported_in(else_block)),
            Statement::Return { expr, .. } => expr.as_ref().and_then(Expression::first_unsupported),
            Statement::Unsupported(loc) => Some(*loc),
        }
    }
}

fn first_unsupported_in(block: &[Statement]) -> Option<Location> {
    block.iter().find_map(Statement::first_unsupported)
}

/// A require, ensure or invariant clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Supported {
        text: String,
        expr: Expression,
        #[serde(default)]
        location: Location,
    },
    Unsupported {
        text: String,
        #[serde(default)]
        location: Location,
    },
}

pub type Require = Clause;
pub type Ensure = Clause;
pub type Invariant = Clause;

impl Clause {
    pub fn supported(text: impl Into<String>, expr: Expression, location: Location) -> Self {
        Self::Supported {
            text: text.into(),
            expr,
            location,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Clause::Supported { text, .. } | Clause::Unsupported { text, .. } => text,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Clause::Supported { location, .. } | Clause::Unsupported { location, .. } => *location,
        }
    }

    pub fn first_unsupported(&self) -> Option<Location> {
        match self {
            Clause::Supported { expr, .. } => expr.first_unsupported(),
            Clause::Unsupported { location, .. } => Some(*location),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsupportedDecl<N> {
    pub name: N,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub location: Location,
}

/// Declaration-level supported/unsupported split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(bound(
    serialize = "T: Serialize, T::Name: Serialize",
    deserialize = "T: Deserialize<'de>, T::Name: Deserialize<'de>"
))]
pub enum Decl<T: Named> {
    Supported(T),
    Unsupported(UnsupportedDecl<T::Name>),
}

impl<T: Named> Decl<T> {
    pub fn supported(&self) -> Option<&T> {
        match self {
            Decl::Supported(t) => Some(t),
            Decl::Unsupported(_) => None,
        }
    }
}

impl<T: Named> Named for Decl<T> {
    type Name = T::Name;

    fn name(&self) -> &T::Name {
        match self {
            Decl::Supported(t) => t.name(),
            Decl::Unsupported(u) => &u.name,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Protected,
    Internal,
    #[default]
    Private,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: MethodName,
    #[serde(default)]
    pub access: Access,
    pub return_type: ExpressionType,
    #[serde(default = "NameTable::sealed_empty")]
    pub parameters: NameTable<Decl<Parameter>>,
    #[serde(default = "NameTable::sealed_empty")]
    pub locals: NameTable<Decl<Local>>,
    #[serde(default)]
    pub requires: Vec<Require>,
    #[serde(default)]
    pub body: Vec<Statement>,
    #[serde(default)]
    pub ensures: Vec<Ensure>,
    #[serde(default)]
    pub location: Location,
}

impl Named for Method {
    type Name = MethodName;

    fn name(&self) -> &MethodName {
        &self.name
    }
}

impl Method {
    pub fn is_supported(&self) -> bool {
        self.first_unsupported().is_none()
    }

    /// Location of the first element that poisons this method.
    pub fn first_unsupported(&self) -> Option<Location> {
        if !self.return_type.is_void() && !self.return_type.is_verifiable() {
            return Some(self.location);
        }
        for p in &self.parameters {
            match p {
                Decl::Unsupported(u) => return Some(u.location),
                Decl::Supported(p) if !p.ty.is_verifiable() => return Some(p.location),
                Decl::Supported(_) => {}
            }
        }
        for l in &self.locals {
            match l {
                Decl::Unsupported(u) => return Some(u.location),
                Decl::Supported(l) if !l.ty.is_verifiable() => return Some(l.location),
                Decl::Supported(_) => {}
            }
        }
        self.requires
            .iter()
            .find_map(Clause::first_unsupported)
            .or_else(|| first_unsupported_in(&self.body))
            .or_else(|| self.ensures.iter().find_map(Clause::first_unsupported))
    }

    pub fn is_public(&self) -> bool {
        self.access == Access::Public
    }

    pub fn is_sealed(&self) -> bool {
        self.parameters.is_sealed() && self.locals.is_sealed()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("class `{class}` was built from unsealed tables")]
    Unsealed { class: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassModel {
    name: ClassName,
    #[serde(default = "NameTable::sealed_empty")]
    fields: NameTable<Decl<Field>>,
    #[serde(default = "NameTable::sealed_empty")]
    methods: NameTable<Decl<Method>>,
    #[serde(default)]
    invariants: Vec<Invariant>,
    #[serde(default)]
    location: Location,
}

impl ClassModel {
    /// Assembles a class from tables that the front-end has already sealed.
    pub fn new(
        name: ClassName,
        fields: NameTable<Decl<Field>>,
        methods: NameTable<Decl<Method>>,
        invariants: Vec<Invariant>,
        location: Location,
    ) -> Result<Self, ModelError> {
        let class = Self {
            name,
            fields,
            methods,
            invariants,
            location,
        };
        if !class.is_sealed() {
            return Err(ModelError::Unsealed {
                class: class.name.to_string(),
            });
        }
        Ok(class)
    }

    pub fn name(&self) -> &ClassName {
        &self.name
    }

    pub fn fields(&self) -> &NameTable<Decl<Field>> {
        &self.fields
    }

    pub fn methods(&self) -> &NameTable<Decl<Method>> {
        &self.methods
    }

    pub fn invariants(&self) -> &[Invariant] {
        &self.invariants
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn is_sealed(&self) -> bool {
        self.fields.is_sealed()
            && self.methods.is_sealed()
            && self
                .methods
                .iter()
                .filter_map(Decl::supported)
                .all(Method::is_sealed)
    }

    pub fn is_supported(&self) -> bool {
        self.first_unsupported().is_none()
    }

    pub fn first_unsupported(&self) -> Option<Location> {
        for f in &self.fields {
            match f {
                Decl::Unsupported(u) => return Some(u.location),
                Decl::Supported(fd) if !fd.ty.is_verifiable() => return Some(fd.location),
                Decl::Supported(_) => {}
            }
        }
        for m in &self.methods {
            match m {
                Decl::Unsupported(u) => return Some(u.location),
                Decl::Supported(md) => {
                    if let Some(loc) = md.first_unsupported() {
                        return Some(loc);
                    }
                }
            }
        }
        self.invariants.iter().find_map(Clause::first_unsupported)
    }

    pub fn supported_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter_map(Decl::supported)
    }

    pub fn supported_methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter_map(Decl::supported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> Decl<Parameter> {
        Decl::Supported(Parameter {
            name: ParameterName::new(name),
            ty: ExpressionType::int(),
            location: Location::default(),
        })
    }

    fn method(name: &str, body: Vec<Statement>) -> Method {
        Method {
            name: MethodName::new(name),
            access: Access::Public,
            return_type: ExpressionType::int(),
            parameters: NameTable::sealed_from([param("x")]).expect("params"),
            locals: NameTable::sealed_from([]).expect("locals"),
            requires: Vec::new(),
            body,
            ensures: Vec::new(),
            location: Location::new(3, 5),
        }
    }

    #[test]
    fn table_rejects_duplicates_and_inserts_after_seal() {
        let mut t = NameTable::new();
        t.insert(param("x")).expect("first insert");
        assert_eq!(t.insert(param("x")), Err(TableError::Duplicate("x".to_string())));

        t.seal();
        assert_eq!(t.insert(param("y")), Err(TableError::Sealed("y".to_string())));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn unresolved_names_do_not_collide() {
        let unsupported = || {
            Decl::<Parameter>::Unsupported(UnsupportedDecl {
                name: ParameterName::unresolved(),
                reason: "params array".to_string(),
                location: Location::new(1, 1),
            })
        };
        let mut t = NameTable::new();
        t.insert(unsupported()).expect("first");
        t.insert(unsupported()).expect("second");
        assert_eq!(t.len(), 2);
        assert!(!t.contains(&ParameterName::unresolved()));
    }

    #[test]
    fn unsupported_statement_poisons_method_and_class() {
        let x = Variable::Parameter(Parameter {
            name: ParameterName::new("x"),
            ty: ExpressionType::int(),
            location: Location::default(),
        });
        let good = method("good", vec![Statement::ret(Some(Expression::var(x)))]);
        let bad = method(
            "bad",
            vec![Statement::conditional(
                Expression::bool(true),
                vec![Statement::Unsupported(Location::new(9, 13))],
                Vec::new(),
            )],
        );
        assert!(good.is_supported());
        assert_eq!(bad.first_unsupported(), Some(Location::new(9, 13)));

        let class = ClassModel::new(
            ClassName::new("Account"),
            NameTable::sealed_from([]).expect("fields"),
            NameTable::sealed_from([Decl::Supported(good), Decl::Supported(bad)]).expect("methods"),
            Vec::new(),
            Location::default(),
        )
        .expect("class");
        assert!(!class.is_supported());
    }

    #[test]
    fn unsupported_clause_poisons_class() {
        let class = ClassModel::new(
            ClassName::new("Account"),
            NameTable::sealed_from([]).expect("fields"),
            NameTable::sealed_from([]).expect("methods"),
            vec![Clause::Unsupported {
                text: "balance.All(b => b > 0)".to_string(),
                location: Location::new(2, 1),
            }],
            Location::default(),
        )
        .expect("class");
        assert_eq!(class.first_unsupported(), Some(Location::new(2, 1)));
    }

    #[test]
    fn class_requires_sealed_tables() {
        let err = ClassModel::new(
            ClassName::new("Open"),
            NameTable::new(),
            NameTable::sealed_from([]).expect("methods"),
            Vec::new(),
            Location::default(),
        )
        .expect_err("unsealed fields must be refused");
        assert_eq!(
            err,
            ModelError::Unsealed {
                class: "Open".to_string()
            }
        );
    }

    #[test]
    fn deserialized_tables_are_sealed_and_reject_duplicates() {
        let ok: NameTable<Decl<Parameter>> = serde_json::from_str(
            r#"[{"supported":{"name":"a","ty":{"named":{"name":"int","nullable":false}}}}]"#,
        )
        .expect("table");
        assert!(ok.is_sealed());
        assert!(ok.contains(&ParameterName::new("a")));

        let dup = serde_json::from_str::<NameTable<Decl<Parameter>>>(
            r#"[{"supported":{"name":"a","ty":"other"}},{"supported":{"name":"a","ty":"other"}}]"#,
        );
        assert!(dup.is_err());
    }

    #[test]
    fn expression_display_uses_operator_text() {
        let e = Expression::compare(
            ComparisonOp::Ge,
            Expression::paren(Expression::arith(ArithmeticOp::Sub, Expression::int(4), Expression::int(1))),
            Expression::unary(UnaryOp::Negate, Expression::int(2)),
        );
        assert_eq!(e.to_string(), "(4 - 1) >= -2");
    }

    #[test]
    fn type_classification() {
        assert!(ExpressionType::int().is_integral());
        assert!(ExpressionType::bool().is_boolean());
        let nullable = ExpressionType::Named {
            name: "int".to_string(),
            nullable: true,
        };
        assert!(!nullable.is_integral());
        assert!(!nullable.is_verifiable());
        assert_eq!(nullable.to_string(), "int?");
        assert!(ExpressionType::named("System.Int64").is_verifiable());
        for unsigned in ["byte", "ushort", "uint", "ulong"] {
            assert!(!ExpressionType::named(unsigned).is_verifiable(), "{unsigned}");
        }
    }

    #[test]
    fn declarations_without_a_sort_poison_the_method() {
        let mut m = method("m", Vec::new());
        m.parameters = NameTable::sealed_from([Decl::Supported(Parameter {
            name: ParameterName::new("n"),
            ty: ExpressionType::named("uint"),
            location: Location::new(4, 12),
        })])
        .expect("params");
        assert_eq!(m.first_unsupported(), Some(Location::new(4, 12)));

        let mut m = method("m", Vec::new());
        m.locals = NameTable::sealed_from([Decl::Supported(Local {
            name: LocalName::new("s"),
            ty: ExpressionType::Other,
            location: Location::new(6, 9),
        })])
        .expect("locals");
        assert_eq!(m.first_unsupported(), Some(Location::new(6, 9)));

        let mut m = method("m", Vec::new());
        m.return_type = ExpressionType::named("string");
        assert_eq!(m.first_unsupported(), Some(Location::new(3, 5)));

        let mut m = method("m", Vec::new());
        m.return_type = ExpressionType::void();
        assert!(m.is_supported());
    }

    #[test]
    fn nullable_field_poisons_class() {
        let field = Field {
            name: FieldName::new("limit"),
            ty: ExpressionType::Named {
                name: "int".to_string(),
                nullable: true,
            },
            initializer: None,
            owner: ClassName::new("Account"),
            property: None,
            location: Location::new(2, 17),
        };
        let class = ClassModel::new(
            ClassName::new("Account"),
            NameTable::sealed_from([Decl::Supported(field)]).expect("fields"),
            NameTable::sealed_from([]).expect("methods"),
            Vec::new(),
            Location::default(),
        )
        .expect("class");
        assert_eq!(class.first_unsupported(), Some(Location::new(2, 17)));
    }
}
