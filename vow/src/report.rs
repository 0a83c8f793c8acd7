#![forbid(unsafe_code)]

use std::fmt::Write as _;

use miette::IntoDiagnostic;
use serde::Serialize;
use vow_verify::{ClassOutcome, ClassReport, ObligationReport, ObligationStatus, Totals};

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub schema: &'static str,
    pub input: String,
    pub classes: &'a [ClassReport],
    pub totals: Totals,
}

impl<'a> RunReport<'a> {
    pub fn new(input: String, classes: &'a [ClassReport]) -> Self {
        Self {
            schema: "vow.report.v1",
            input,
            classes,
            totals: totals(classes),
        }
    }
}

pub fn totals(classes: &[ClassReport]) -> Totals {
    let mut t = Totals::default();
    for c in classes {
        t += c.totals();
    }
    t
}

/// 0 clean, 1 violations found, 2 nothing violated but something left unchecked.
pub fn exit_code(classes: &[ClassReport]) -> u8 {
    if classes.iter().any(|c| c.violations().next().is_some()) {
        1
    } else if classes.iter().any(ClassReport::is_incomplete) {
        2
    } else {
        0
    }
}

pub fn render_json(report: &RunReport<'_>) -> miette::Result<String> {
    serde_json::to_string_pretty(report).into_diagnostic()
}

fn status_tag(o: &ObligationReport) -> &'static str {
    match o.status {
        ObligationStatus::Proved => "proved",
        ObligationStatus::Violated(_) => "VIOLATED",
        ObligationStatus::Inconclusive(_) => "unknown",
    }
}

fn render_obligation(out: &mut String, indent: &str, o: &ObligationReport) {
    let _ = write!(
        out,
        "{indent}{:<8} {} `{}` at {} ({} ms)",
        status_tag(o),
        o.kind,
        o.subject,
        o.location,
        o.duration_ms
    );
    match &o.status {
        ObligationStatus::Proved => {}
        ObligationStatus::Violated(v) => {
            if let Some(cex) = v.counterexample().filter(|c| !c.is_empty()) {
                let _ = write!(out, "\n{indent}         counterexample: {}", cex.display_compact());
            }
        }
        ObligationStatus::Inconclusive(reason) => {
            let _ = write!(out, "\n{indent}         {reason}");
        }
    }
    out.push('\n');
    if let Some(smt) = &o.smt {
        for line in smt.lines() {
            let _ = writeln!(out, "{indent}    | {line}");
        }
    }
}

pub fn render_text(classes: &[ClassReport]) -> String {
    let mut out = String::new();
    for c in classes {
        let _ = writeln!(out, "class {} [{}] ({} ms)", c.class, c.solver, c.duration_ms);
        match &c.outcome {
            ClassOutcome::Checked { initial, methods } => {
                for o in initial {
                    render_obligation(&mut out, "  ", o);
                }
                for m in methods {
                    let _ = writeln!(out, "  method {}", m.method);
                    for o in &m.obligations {
                        render_obligation(&mut out, "    ", o);
                    }
                }
            }
            ClassOutcome::Unsupported { location } => {
                let _ = writeln!(out, "  skipped: unsupported construct at {location}");
            }
            ClassOutcome::Fault { message } => {
                let _ = writeln!(out, "  not checked: {message}");
            }
        }
        let _ = writeln!(out, "  {}", c.totals());
    }
    if classes.len() > 1 {
        let _ = writeln!(out, "total: {}", totals(classes));
    }
    out
}
