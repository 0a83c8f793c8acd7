#![forbid(unsafe_code)]

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};
use vow_verify::{duration_ms, CheckOutcome, Formula, Solver, SolverError};

use crate::channel::Channel;
use crate::wire::{self, Request, Response};

struct ClientState {
    requests: Channel,
    responses: Channel,
    next_id: u64,
    /// Set once the bridge is torn down; every later check fails with it.
    failed: Option<String>,
}

impl ClientState {
    fn teardown(&mut self, reason: String) -> SolverError {
        self.requests.close();
        self.responses.close();
        self.failed = Some(reason.clone());
        SolverError::Unavailable(reason)
    }
}

/// `Solver` that forwards each query to a worker over two channels.
///
/// Queries are serialized; concurrent callers wait their turn. A worker that
/// does not answer within the response timeout is abandoned and every
/// later query reports `Unavailable`. Dropping the client closes both
/// channels, which stops the worker.
pub struct ChannelSolver {
    state: Mutex<ClientState>,
    poll_interval: Duration,
    response_timeout: Duration,
}

impl ChannelSolver {
    /// `requests` must be open for sending and `responses` for receiving.
    pub fn new(requests: Channel, responses: Channel, poll_interval: Duration, response_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ClientState {
                requests,
                responses,
                next_id: 0,
                failed: None,
            }),
            poll_interval,
            response_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().failed.is_none()
    }
}

impl Solver for ChannelSolver {
    fn name(&self) -> &str {
        "worker"
    }

    fn check(&self, formula: &Formula) -> Result<CheckOutcome, SolverError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.failed {
            return Err(SolverError::Unavailable(reason.clone()));
        }

        let id = state.next_id;
        state.next_id += 1;
        let frame = wire::encode(&Request {
            id,
            formula: formula.clone(),
        })
        .map_err(|e| SolverError::Backend(e.to_string()))?;

        let free = match state.requests.free_length() {
            Ok(free) => free,
            Err(e) => return Err(state.teardown(e.to_string())),
        };
        if frame.len() > free {
            return Err(SolverError::Backend(format!(
                "query of {} bytes exceeds channel free length {free}",
                frame.len()
            )));
        }
        if let Err(e) = state.requests.write(&frame) {
            return Err(state.teardown(e.to_string()));
        }

        let started = Instant::now();
        loop {
            match state.responses.read() {
                Ok(Some(frame)) => match wire::decode::<Response>(&frame) {
                    Ok(response) if response.id == id => return response.result,
                    Ok(stale) => debug!(id = stale.id, expected = id, "discarding stale response"),
                    Err(e) => warn!(error = %e, "discarding undecodable response"),
                },
                Ok(None) => {
                    if started.elapsed() >= self.response_timeout {
                        warn!(
                            id,
                            timeout_ms = duration_ms(self.response_timeout),
                            "solver worker did not answer; tearing down bridge"
                        );
                        return Err(state.teardown(format!(
                            "no response within {} ms",
                            duration_ms(self.response_timeout)
                        )));
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(state.teardown(e.to_string())),
            }
        }
    }
}
