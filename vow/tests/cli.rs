use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use vow_model::{
    Access, ArithmeticOp, ClassModel, ClassName, Clause, ComparisonOp, Decl, Expression, ExpressionType,
    Local, LocalName, Location, Method, MethodName, NameTable, Parameter, ParameterName, Statement,
    Variable,
};

fn vow(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vow"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run vow")
}

/// `Dec(x) requires x > 0 { return x - 1 } ensures <ensure> result`.
fn decrement(ensure_bound: i64) -> ClassModel {
    let x = Variable::Parameter(Parameter {
        name: ParameterName::new("x"),
        ty: ExpressionType::int(),
        location: Location::default(),
    });
    let Variable::Parameter(decl) = x.clone() else {
        unreachable!()
    };
    let requires = Expression::compare(ComparisonOp::Gt, Expression::var(x.clone()), Expression::int(0));
    let ensures = Expression::compare(ComparisonOp::Ge, Expression::Result, Expression::int(ensure_bound));
    let method = Method {
        name: MethodName::new("Dec"),
        access: Access::Public,
        return_type: ExpressionType::int(),
        parameters: NameTable::sealed_from([Decl::Supported(decl)]).expect("params"),
        locals: NameTable::sealed_empty(),
        requires: vec![Clause::supported(requires.to_string(), requires, Location::new(2, 3))],
        body: vec![Statement::ret(Some(Expression::arith(
            ArithmeticOp::Sub,
            Expression::var(x),
            Expression::int(1),
        )))],
        ensures: vec![Clause::supported(ensures.to_string(), ensures, Location::new(3, 3))],
        location: Location::new(1, 1),
    };
    ClassModel::new(
        ClassName::new("Counter"),
        NameTable::sealed_empty(),
        NameTable::sealed_from([Decl::Supported(method)]).expect("methods"),
        vec![],
        Location::new(1, 1),
    )
    .expect("class")
}

/// `Five() { x = 5; return x } ensures result == 5`, decidable without search.
fn constant() -> ClassModel {
    let x = Variable::Local(Local {
        name: LocalName::new("x"),
        ty: ExpressionType::int(),
        location: Location::default(),
    });
    let Variable::Local(decl) = x.clone() else {
        unreachable!()
    };
    let ensures = Expression::compare(ComparisonOp::Eq, Expression::Result, Expression::int(5));
    let method = Method {
        name: MethodName::new("Five"),
        access: Access::Public,
        return_type: ExpressionType::int(),
        parameters: NameTable::sealed_empty(),
        locals: NameTable::sealed_from([Decl::Supported(decl)]).expect("locals"),
        requires: Vec::new(),
        body: vec![
            Statement::assign(x.clone(), Expression::int(5)),
            Statement::ret(Some(Expression::var(x))),
        ],
        ensures: vec![Clause::supported(ensures.to_string(), ensures, Location::new(3, 3))],
        location: Location::new(1, 1),
    };
    ClassModel::new(
        ClassName::new("Constant"),
        NameTable::sealed_empty(),
        NameTable::sealed_from([Decl::Supported(method)]).expect("methods"),
        vec![],
        Location::new(1, 1),
    )
    .expect("class")
}

fn write_model(dir: &Path, classes: &[ClassModel]) -> PathBuf {
    let path = dir.join("model.json");
    fs::write(&path, serde_json::to_string(classes).expect("serialize")).expect("write model");
    path
}

#[test]
fn clean_model_exits_zero_with_json_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = write_model(dir.path(), &[constant()]);

    let out = vow(&["check", model.to_str().expect("utf8"), "--format", "json"]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json report");
    assert_eq!(report["schema"], "vow.report.v1");
    assert_eq!(report["totals"]["proved"], 1);
    assert_eq!(report["totals"]["violated"], 0);
}

#[test]
fn bounded_search_without_proof_exits_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = write_model(dir.path(), &[decrement(0)]);

    let out = vow(&["check", model.to_str().expect("utf8"), "--solver", "bounded", "--format", "json"]);
    assert_eq!(out.status.code(), Some(2), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json report");
    assert_eq!(report["totals"]["proved"], 1);
    assert_eq!(report["totals"]["inconclusive"], 1);
    assert_eq!(report["totals"]["violated"], 0);
}

#[test]
fn violation_exits_one_and_is_rendered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = write_model(dir.path(), &[decrement(1)]);

    let out = vow(&["check", model.to_str().expect("utf8"), "--sequential"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("VIOLATED ensures `result >= 1`"), "{stdout}");
    assert!(stdout.contains("counterexample: x = 1"), "{stdout}");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("may violate ensures"), "{stderr}");
}

#[test]
fn config_file_selects_worker_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = write_model(dir.path(), &[constant()]);
    fs::write(
        dir.path().join("vow.toml"),
        "[solver]\nbackend = \"worker\"\n\n[bridge]\npoll_interval_ms = 2\n",
    )
    .expect("write config");

    let out = vow(&["check", model.to_str().expect("utf8"), "--format", "json"]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json report");
    assert_eq!(report["classes"][0]["solver"], "worker");
}

#[test]
fn print_config_reports_effective_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("vow.toml"), "[bounded]\nradius = 4\n").expect("write config");

    let out = vow(&["print-config", dir.path().to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("radius = 4"), "{stdout}");
    assert!(stdout.contains("backend = \"bounded\""), "{stdout}");
}

#[test]
fn unreadable_model_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.json");
    let out = vow(&["check", missing.to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(2));
}

#[cfg(not(feature = "z3"))]
#[test]
fn z3_without_feature_is_inconclusive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = write_model(dir.path(), &[decrement(0)]);

    let out = vow(&["check", model.to_str().expect("utf8"), "--solver", "z3"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stdout).contains("solver unavailable"));
}
