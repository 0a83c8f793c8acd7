#![forbid(unsafe_code)]

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use vow_verify::{duration_ms, Solver, SolverError};

use crate::channel::{Channel, ChannelError};
use crate::wire::{self, Request, Response};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// No request arrived within the idle window.
    IdleTimeout,
    /// A channel was closed or failed under the worker.
    ChannelClosed(ChannelError),
}

/// Serves `check` requests read from `inbound`, answering on `outbound`.
pub struct SolverWorker<S> {
    solver: S,
    inbound: Channel,
    outbound: Channel,
    config: WorkerConfig,
}

impl<S: Solver> SolverWorker<S> {
    /// Both channels must already be open.
    pub fn new(solver: S, inbound: Channel, outbound: Channel, config: WorkerConfig) -> Self {
        Self {
            solver,
            inbound,
            outbound,
            config,
        }
    }

    pub fn run(mut self) -> WorkerExit {
        info!(
            solver = self.solver.name(),
            inbound = self.inbound.name(),
            "solver worker started"
        );
        let mut last_message = Instant::now();
        let exit = loop {
            match self.inbound.read() {
                Ok(Some(frame)) => {
                    last_message = Instant::now();
                    if let Some(exit) = self.handle(&frame) {
                        break exit;
                    }
                }
                Ok(None) => {
                    if last_message.elapsed() >= self.config.idle_timeout {
                        info!(idle_ms = duration_ms(self.config.idle_timeout), "solver worker idle; closing");
                        break WorkerExit::IdleTimeout;
                    }
                    thread::sleep(self.config.poll_interval);
                }
                Err(e) => break WorkerExit::ChannelClosed(e),
            }
        };
        self.inbound.close();
        self.outbound.close();
        debug!(?exit, "solver worker stopped");
        exit
    }

    fn handle(&mut self, frame: &[u8]) -> Option<WorkerExit> {
        let Request { id, formula } = match wire::decode::<Request>(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "dropping undecodable request");
                return None;
            }
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.solver.check(&formula)))
            .unwrap_or_else(|panic| {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "solver panicked".to_string());
                Err(SolverError::Backend(msg))
            });
        self.reply(&Response { id, result })
    }

    fn reply(&mut self, response: &Response) -> Option<WorkerExit> {
        let frame = match wire::encode(response) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "cannot encode response");
                return None;
            }
        };
        match self.outbound.write(&frame) {
            Ok(()) => None,
            Err(ChannelError::Overflow { len, free }) => {
                warn!(id = response.id, len, free, "response does not fit the channel");
                let fallback = Response {
                    id: response.id,
                    result: Err(SolverError::Backend(format!(
                        "response of {len} bytes exceeds channel free length {free}"
                    ))),
                };
                let frame = wire::encode(&fallback).ok()?;
                match self.outbound.write(&frame) {
                    Ok(()) | Err(ChannelError::Overflow { .. }) => None,
                    Err(e) => Some(WorkerExit::ChannelClosed(e)),
                }
            }
            Err(e) => Some(WorkerExit::ChannelClosed(e)),
        }
    }
}
