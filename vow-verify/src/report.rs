//! Per-obligation results and class-level totals.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use vow_model::{ClassName, Location, MethodName};

use crate::violation::Violation;

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    /// Requires clauses are jointly satisfiable.
    Precondition,
    Ensure,
    InvariantInitial,
    InvariantPreservation,
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObligationKind::Precondition => "requires",
            ObligationKind::Ensure => "ensures",
            ObligationKind::InvariantInitial => "invariant (initial)",
            ObligationKind::InvariantPreservation => "invariant (preserved)",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InconclusiveReason {
    SolverUnknown(String),
    SolverUnavailable(String),
    /// Broken internal invariant while building the obligation.
    InternalFault(String),
}

impl fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InconclusiveReason::SolverUnknown(r) => write!(f, "solver returned unknown: {r}"),
            InconclusiveReason::SolverUnavailable(r) => write!(f, "solver unavailable: {r}"),
            InconclusiveReason::InternalFault(r) => write!(f, "internal error: {r}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Proved,
    Violated(Violation),
    Inconclusive(InconclusiveReason),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObligationReport {
    pub kind: ObligationKind,
    pub method: Option<MethodName>,
    /// Clause text the obligation is about.
    pub subject: String,
    pub location: Location,
    pub duration_ms: u64,
    pub status: ObligationStatus,
    /// SMT-LIB2 text of the query, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smt: Option<String>,
}

impl ObligationReport {
    pub fn is_proved(&self) -> bool {
        matches!(self.status, ObligationStatus::Proved)
    }

    pub fn violation(&self) -> Option<&Violation> {
        match &self.status {
            ObligationStatus::Violated(v) => Some(v),
            _ => None,
        }
    }

    pub fn inconclusive(&self) -> Option<&InconclusiveReason> {
        match &self.status {
            ObligationStatus::Inconclusive(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MethodReport {
    pub method: MethodName,
    pub obligations: Vec<ObligationReport>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassOutcome {
    Checked {
        initial: Vec<ObligationReport>,
        methods: Vec<MethodReport>,
    },
    /// Fail-closed: nothing in the class was submitted.
    Unsupported { location: Location },
    /// The class could not be checked at all, e.g. unsealed tables.
    Fault { message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassReport {
    pub class: ClassName,
    pub solver: String,
    pub duration_ms: u64,
    pub outcome: ClassOutcome,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub proved: usize,
    pub violated: usize,
    pub inconclusive: usize,
}

impl Totals {
    pub fn total(&self) -> usize {
        self.proved + self.violated + self.inconclusive
    }
}

impl std::ops::AddAssign for Totals {
    fn add_assign(&mut self, rhs: Self) {
        self.proved += rhs.proved;
        self.violated += rhs.violated;
        self.inconclusive += rhs.inconclusive;
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} obligations: {} proved, {} violated, {} inconclusive",
            self.total(),
            self.proved,
            self.violated,
            self.inconclusive
        )
    }
}

impl ClassReport {
    pub fn obligations(&self) -> impl Iterator<Item = &ObligationReport> {
        let (initial, methods) = match &self.outcome {
            ClassOutcome::Checked { initial, methods } => (initial.as_slice(), methods.as_slice()),
            _ => (&[][..], &[][..]),
        };
        initial
            .iter()
            .chain(methods.iter().flat_map(|m| m.obligations.iter()))
    }

    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.obligations().filter_map(ObligationReport::violation)
    }

    pub fn totals(&self) -> Totals {
        let mut t = Totals::default();
        for o in self.obligations() {
            match o.status {
                ObligationStatus::Proved => t.proved += 1,
                ObligationStatus::Violated(_) => t.violated += 1,
                ObligationStatus::Inconclusive(_) => t.inconclusive += 1,
            }
        }
        t
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.outcome, ClassOutcome::Unsupported { .. })
    }

    /// True when some part of the class was neither proved nor refuted.
    pub fn is_incomplete(&self) -> bool {
        match self.outcome {
            ClassOutcome::Checked { .. } => self.totals().inconclusive > 0,
            ClassOutcome::Unsupported { .. } | ClassOutcome::Fault { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_saturate_instead_of_wrapping() {
        assert_eq!(duration_ms(Duration::from_micros(1_500_900)), 1_500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
        assert_eq!(duration_ms(Duration::from_secs(u64::MAX / 1000 + 1)), u64::MAX);
    }
}
