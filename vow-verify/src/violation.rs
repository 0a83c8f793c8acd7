#![forbid(unsafe_code)]

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use vow_model::{Ensure, Invariant, Location, MethodName, Span};

use crate::counterexample::Counterexample;

/// A method's requires clauses can never hold together.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequireViolation {
    pub method: MethodName,
    pub assertion: String,
    pub location: Location,
    /// Call statement or expression that triggered the check, when known.
    pub call: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnsureViolation {
    pub method: MethodName,
    pub ensure: Ensure,
    pub counterexample: Option<Counterexample>,
}

/// An invariant that is not established by the initializers (`method` is
/// `None`) or not preserved by a public method.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvariantViolation {
    pub invariant: Invariant,
    pub method: Option<MethodName>,
    pub counterexample: Option<Counterexample>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Require(RequireViolation),
    Ensure(EnsureViolation),
    Invariant(InvariantViolation),
}

impl Violation {
    pub fn assertion(&self) -> &str {
        match self {
            Violation::Require(v) => &v.assertion,
            Violation::Ensure(v) => v.ensure.text(),
            Violation::Invariant(v) => v.invariant.text(),
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Violation::Require(v) => v.location,
            Violation::Ensure(v) => v.ensure.location(),
            Violation::Invariant(v) => v.invariant.location(),
        }
    }

    pub fn counterexample(&self) -> Option<&Counterexample> {
        match self {
            Violation::Require(_) => None,
            Violation::Ensure(v) => v.counterexample.as_ref(),
            Violation::Invariant(v) => v.counterexample.as_ref(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Violation::Require(v) => format!(
                "requires of `{}` can never be satisfied: `{}`",
                v.method, v.assertion
            ),
            Violation::Ensure(v) => format!("`{}` may violate ensures `{}`", v.method, v.ensure.text()),
            Violation::Invariant(InvariantViolation {
                invariant,
                method: Some(m),
                ..
            }) => format!("`{m}` may break invariant `{}`", invariant.text()),
            Violation::Invariant(v) => format!(
                "invariant `{}` does not hold after initialization",
                v.invariant.text()
            ),
        }
    }
}

/// Renderable form of a violation.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(vow::verify))]
pub struct VerifyError {
    pub message: String,
    #[label("at {location}")]
    pub span: Span,
    pub location: Location,
    #[help]
    pub counterexample: Option<String>,
}

impl From<&Violation> for VerifyError {
    fn from(v: &Violation) -> Self {
        let location = v.location();
        Self {
            message: v.message(),
            span: location.span(),
            location,
            counterexample: v
                .counterexample()
                .filter(|c| !c.is_empty())
                .map(|c| format!("counterexample: {}", c.display_compact())),
        }
    }
}
