#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vow_bridge::{BridgeConfig, WorkerConfig};
use vow_verify::{BoundedSolver, EngineConfig, SmtProfile};

pub const CONFIG_FILE: &str = "vow.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(vow::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Bounded,
    Z3,
    Worker,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VowConfig {
    pub solver: SolverSection,
    pub bounded: BoundedSection,
    pub engine: EngineSection,
    pub bridge: BridgeSection,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub backend: Backend,
    pub profile: SmtProfile,
    /// Overrides the profile's timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u32>,
}

impl SolverSection {
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms.unwrap_or_else(|| self.profile.default_timeout_ms())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundedSection {
    pub radius: u32,
    pub max_assignments: u64,
}

impl Default for BoundedSection {
    fn default() -> Self {
        Self {
            radius: 8,
            max_assignments: 250_000,
        }
    }
}

impl BoundedSection {
    pub fn solver(&self) -> BoundedSolver {
        BoundedSolver::new(self.radius, self.max_assignments)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub parallel: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub capacity: usize,
    pub poll_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            capacity: 65_536,
            poll_interval_ms: 20,
            idle_timeout_ms: 60_000,
            response_timeout_ms: 30_000,
        }
    }
}

impl BridgeSection {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            capacity: self.capacity,
            worker: WorkerConfig {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            },
            response_timeout: Duration::from_millis(self.response_timeout_ms),
        }
    }
}

impl VowConfig {
    pub fn engine_config(&self, emit_smt: bool) -> EngineConfig {
        EngineConfig {
            parallel: self.engine.parallel,
            emit_smt,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedConfig {
    /// `None` when no `vow.toml` was found and defaults apply.
    pub path: Option<PathBuf>,
    pub config: VowConfig,
}

pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return None,
        }
    }
}

pub fn parse_config(text: &str) -> Result<VowConfig, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError {
        message: e.to_string(),
    })
}

pub fn load_config(path: &Path) -> Result<VowConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    parse_config(&text).map_err(|e| ConfigError {
        message: format!("{}: {}", path.display(), e.message),
    })
}

/// An explicit path must exist; otherwise walk up from `start`.
pub fn resolve_config(explicit: Option<&Path>, start: &Path) -> Result<ResolvedConfig, ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(start),
    };
    match path {
        Some(path) => Ok(ResolvedConfig {
            config: load_config(&path)?,
            path: Some(path),
        }),
        None => Ok(ResolvedConfig::default()),
    }
}
