#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vow_bridge::{SegmentRegistry, SolverHost, spawn_solver_host};
use vow_model::ClassModel;
use vow_verify::{ClassReport, Engine, SmtProfile, Solver, VerifyError};

use config::{Backend, VowConfig};

mod config;
mod report;

#[derive(Parser, Debug)]
#[command(name = "vow", version, about = "Contract verifier for class models")]
struct Cli {
    /// Path to `vow.toml`. Defaults to the nearest one above the input.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
enum SmtProfileArg {
    Fast,
    Ci,
    Thorough,
}

impl From<SmtProfileArg> for SmtProfile {
    fn from(v: SmtProfileArg) -> Self {
        match v {
            SmtProfileArg::Fast => SmtProfile::Fast,
            SmtProfileArg::Ci => SmtProfile::Ci,
            SmtProfileArg::Thorough => SmtProfile::Thorough,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Verify every class in a JSON class model
    Check {
        /// Model file: one class or an array of classes
        model: PathBuf,

        /// Solver backend. Overrides `vow.toml`.
        #[arg(long, value_enum)]
        solver: Option<Backend>,

        /// SMT solver profile: `fast`, `ci`, or `thorough`
        #[arg(long, value_enum)]
        smt_profile: Option<SmtProfileArg>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Verify methods one at a time instead of on the thread pool
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Attach the SMT-LIB2 query of each obligation to the report
        #[arg(long, default_value_t = false)]
        emit_smt: bool,
    },

    /// Print the effective configuration as TOML
    PrintConfig {
        /// Directory to start the `vow.toml` search from
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelFile {
    Many(Vec<ClassModel>),
    One(Box<ClassModel>),
}

fn load_models(path: &Path) -> miette::Result<Vec<ClassModel>> {
    let text = fs::read_to_string(path).into_diagnostic()?;
    let file: ModelFile = serde_json::from_str(&text).into_diagnostic()?;
    Ok(match file {
        ModelFile::Many(classes) => classes,
        ModelFile::One(class) => vec![*class],
    })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "vow=debug" } else { "vow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Keeps a hosted worker alive for as long as its client is in use.
enum ActiveSolver {
    Local(Box<dyn Solver>),
    Hosted(SolverHost),
}

impl ActiveSolver {
    fn solver(&self) -> &dyn Solver {
        match self {
            ActiveSolver::Local(s) => s.as_ref(),
            ActiveSolver::Hosted(host) => host.client(),
        }
    }

    fn finish(self) {
        if let ActiveSolver::Hosted(host) = self {
            match host.shutdown() {
                Ok(exit) => info!(?exit, "solver worker finished"),
                Err(e) => warn!(error = %e, "solver worker did not finish cleanly"),
            }
        }
    }
}

#[cfg(feature = "z3")]
fn z3_solver(timeout_ms: u32) -> Box<dyn Solver> {
    Box::new(vow_verify::Z3Solver::new(timeout_ms))
}

#[cfg(not(feature = "z3"))]
fn z3_solver(_timeout_ms: u32) -> Box<dyn Solver> {
    warn!("built without the `z3` feature; every obligation will be inconclusive");
    Box::new(vow_verify::UnavailableSolver::new("vow was built without the `z3` feature"))
}

fn select_solver(cfg: &VowConfig) -> miette::Result<ActiveSolver> {
    Ok(match cfg.solver.backend {
        Backend::Bounded => ActiveSolver::Local(Box::new(cfg.bounded.solver())),
        Backend::Z3 => ActiveSolver::Local(z3_solver(cfg.solver.timeout_ms())),
        Backend::Worker => {
            let registry = SegmentRegistry::new();
            let bridge = cfg.bridge.bridge_config();
            // The worker hosts Z3 when it is compiled in.
            let host = if cfg!(feature = "z3") {
                spawn_solver_host(&registry, z3_solver(cfg.solver.timeout_ms()), bridge)?
            } else {
                spawn_solver_host(&registry, cfg.bounded.solver(), bridge)?
            };
            ActiveSolver::Hosted(host)
        }
    })
}

fn check(
    model: &Path,
    cfg: &VowConfig,
    format: Format,
    emit_smt: bool,
) -> miette::Result<ExitCode> {
    let classes = load_models(model)?;
    let active = select_solver(cfg)?;
    info!(
        classes = classes.len(),
        solver = active.solver().name(),
        model = %model.display(),
        "verifying"
    );

    let engine = Engine::with_config(active.solver(), cfg.engine_config(emit_smt));
    let reports: Vec<ClassReport> = classes.iter().map(|c| engine.verify_class(c)).collect();
    active.finish();

    match format {
        Format::Text => {
            for v in reports.iter().flat_map(ClassReport::violations) {
                eprintln!("{:?}", miette::Report::new(VerifyError::from(v)));
            }
            print!("{}", report::render_text(&reports));
        }
        Format::Json => {
            let run = report::RunReport::new(model.display().to_string(), &reports);
            println!("{}", report::render_json(&run)?);
        }
    }
    Ok(ExitCode::from(report::exit_code(&reports)))
}

fn run(cli: Cli) -> miette::Result<ExitCode> {
    match cli.cmd {
        Cmd::Check {
            model,
            solver,
            smt_profile,
            format,
            sequential,
            emit_smt,
        } => {
            let resolved = config::resolve_config(cli.config.as_deref(), &model)?;
            if let Some(path) = &resolved.path {
                info!(config = %path.display(), "loaded configuration");
            }
            let mut cfg = resolved.config;
            if let Some(backend) = solver {
                cfg.solver.backend = backend;
            }
            if let Some(profile) = smt_profile {
                cfg.solver.profile = profile.into();
            }
            if sequential {
                cfg.engine.parallel = false;
            }
            check(&model, &cfg, format, emit_smt)
        }
        Cmd::PrintConfig { path } => {
            let resolved = config::resolve_config(cli.config.as_deref(), &path)?;
            match &resolved.path {
                Some(p) => println!("# {}", p.display()),
                None => println!("# defaults (no {} found)", config::CONFIG_FILE),
            }
            print!("{}", toml::to_string_pretty(&resolved.config).into_diagnostic()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::from(2)
        }
    }
}
