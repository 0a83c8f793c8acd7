#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;
use vow_verify::Solver;

pub mod channel;
pub mod client;
pub mod wire;
pub mod worker;

pub use channel::{Channel, ChannelError, ChannelMode, SegmentRegistry};
pub use client::ChannelSolver;
pub use wire::{Request, Response, WireError};
pub use worker::{SolverWorker, WorkerConfig, WorkerExit};

#[derive(Debug, Error, Diagnostic)]
#[error("bridge error: {message}")]
#[diagnostic(code(vow::bridge))]
pub struct BridgeError {
    pub message: String,
}

impl From<ChannelError> for BridgeError {
    fn from(e: ChannelError) -> Self {
        Self { message: e.to_string() }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    /// Capacity of each segment in bytes, frame headers included.
    pub capacity: usize,
    pub worker: WorkerConfig,
    pub response_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: 64 * 1024,
            worker: WorkerConfig::default(),
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// A solver running on its own thread behind a pair of channels.
pub struct SolverHost {
    client: ChannelSolver,
    worker: JoinHandle<WorkerExit>,
}

impl SolverHost {
    pub fn client(&self) -> &ChannelSolver {
        &self.client
    }

    /// Disconnects the client and waits for the worker to stop.
    pub fn shutdown(self) -> Result<WorkerExit, BridgeError> {
        drop(self.client);
        self.worker.join().map_err(|_| BridgeError {
            message: "solver worker panicked".to_string(),
        })
    }

    /// Waits for the worker to stop on its own (idle timeout), keeping the
    /// client so callers can observe the disconnected state.
    pub fn join_worker(self) -> Result<(ChannelSolver, WorkerExit), BridgeError> {
        let exit = self.worker.join().map_err(|_| BridgeError {
            message: "solver worker panicked".to_string(),
        })?;
        Ok((self.client, exit))
    }
}

/// Creates a request and a response segment in `registry`, opens all four
/// ends and starts a worker serving `solver`.
pub fn spawn_solver_host<S>(
    registry: &Arc<SegmentRegistry>,
    solver: S,
    config: BridgeConfig,
) -> Result<SolverHost, BridgeError>
where
    S: Solver + 'static,
{
    let request_name = registry.fresh_name("vow-req");
    let response_name = registry.fresh_name("vow-resp");
    registry.create(&request_name, config.capacity)?;
    if let Err(e) = registry.create(&response_name, config.capacity) {
        registry.remove(&request_name);
        return Err(e.into());
    }

    let mut requests = Channel::new(registry, &request_name, ChannelMode::Send);
    let mut inbound = Channel::new(registry, &request_name, ChannelMode::Receive);
    let mut outbound = Channel::new(registry, &response_name, ChannelMode::Send);
    let mut responses = Channel::new(registry, &response_name, ChannelMode::Receive);
    for end in [&mut requests, &mut inbound, &mut outbound, &mut responses] {
        end.open()?;
    }
    // Open ends hold their own handles.
    registry.remove(&request_name);
    registry.remove(&response_name);

    let worker = SolverWorker::new(solver, inbound, outbound, config.worker);
    let worker = thread::Builder::new()
        .name("vow-solver-worker".to_string())
        .spawn(move || worker.run())
        .map_err(|e| BridgeError {
            message: format!("cannot spawn solver worker: {e}"),
        })?;
    debug!(requests = %request_name, responses = %response_name, "solver host started");

    Ok(SolverHost {
        client: ChannelSolver::new(requests, responses, config.worker.poll_interval, config.response_timeout),
        worker,
    })
}
