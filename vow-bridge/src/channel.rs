#![forbid(unsafe_code)]

//! Named, fixed-capacity, one-way message channels.
//!
//! A segment is a bounded byte ring registered under an opaque name. One
//! side opens it in `Send` mode and the other in `Receive` mode. Messages
//! are framed with a 4-byte little-endian length. Nothing blocks: `read`
//! polls and `write` refuses payloads larger than the free length.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

const FRAME_HEADER: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no segment named `{0}`")]
    UnknownSegment(String),
    #[error("a segment named `{0}` already exists")]
    SegmentExists(String),
    #[error("channel `{0}` is not open")]
    NotOpen(String),
    #[error("channel `{0}` is already open")]
    AlreadyOpen(String),
    #[error("channel `{0}` is closed")]
    Closed(String),
    #[error("channel `{name}` is open for {mode:?}")]
    WrongMode { name: String, mode: ChannelMode },
    #[error("payload of {len} bytes exceeds free length {free}")]
    Overflow { len: usize, free: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    Send,
    Receive,
}

#[derive(Debug)]
struct SegmentState {
    bytes: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug)]
struct Segment {
    capacity: usize,
    state: Mutex<SegmentState>,
}

/// Owner of every live segment. Shared by the two ends of a bridge and
/// passed explicitly; there is no process-wide registry.
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    segments: Mutex<HashMap<String, Arc<Segment>>>,
    nonce: AtomicU64,
}

impl SegmentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create(&self, name: &str, capacity: usize) -> Result<(), ChannelError> {
        let mut segments = self.segments.lock();
        if segments.contains_key(name) {
            return Err(ChannelError::SegmentExists(name.to_string()));
        }
        segments.insert(
            name.to_string(),
            Arc::new(Segment {
                capacity,
                state: Mutex::new(SegmentState {
                    bytes: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
            }),
        );
        Ok(())
    }

    /// A segment name not yet handed out by this registry.
    pub fn fresh_name(&self, prefix: &str) -> String {
        let n = self.nonce.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{}-{n}", std::process::id())
    }

    /// Drops the registry's handle; ends that already opened it keep theirs.
    pub fn remove(&self, name: &str) -> bool {
        self.segments.lock().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.segments.lock().contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Arc<Segment>> {
        self.segments.lock().get(name).cloned()
    }
}

#[derive(Debug)]
enum End {
    Unopened,
    Open(Arc<Segment>),
    Closed,
}

/// One end of a segment.
#[derive(Debug)]
pub struct Channel {
    registry: Arc<SegmentRegistry>,
    name: String,
    mode: ChannelMode,
    end: End,
}

impl Channel {
    pub fn new(registry: &Arc<SegmentRegistry>, name: impl Into<String>, mode: ChannelMode) -> Self {
        Self {
            registry: Arc::clone(registry),
            name: name.into(),
            mode,
            end: End::Unopened,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn open(&mut self) -> Result<(), ChannelError> {
        match self.end {
            End::Open(_) => return Err(ChannelError::AlreadyOpen(self.name.clone())),
            End::Closed => return Err(ChannelError::Closed(self.name.clone())),
            End::Unopened => {}
        }
        let segment = self
            .registry
            .get(&self.name)
            .ok_or_else(|| ChannelError::UnknownSegment(self.name.clone()))?;
        if segment.state.lock().closed {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        self.end = End::Open(segment);
        Ok(())
    }

    /// Closes the segment for both ends. Idempotent.
    pub fn close(&mut self) {
        if let End::Open(segment) = &self.end {
            let mut state = segment.state.lock();
            state.closed = true;
            state.bytes.clear();
        }
        self.end = End::Closed;
    }

    pub fn is_open(&self) -> bool {
        match &self.end {
            End::Open(segment) => !segment.state.lock().closed,
            End::Unopened | End::Closed => false,
        }
    }

    fn segment(&self, mode: ChannelMode) -> Result<&Arc<Segment>, ChannelError> {
        let segment = match &self.end {
            End::Open(s) => s,
            End::Unopened => return Err(ChannelError::NotOpen(self.name.clone())),
            End::Closed => return Err(ChannelError::Closed(self.name.clone())),
        };
        if self.mode != mode {
            return Err(ChannelError::WrongMode {
                name: self.name.clone(),
                mode: self.mode,
            });
        }
        Ok(segment)
    }

    /// Largest payload a `write` would accept right now.
    pub fn free_length(&self) -> Result<usize, ChannelError> {
        let segment = self.segment(ChannelMode::Send)?;
        let state = segment.state.lock();
        if state.closed {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        Ok(segment
            .capacity
            .saturating_sub(state.bytes.len())
            .saturating_sub(FRAME_HEADER))
    }

    /// Enqueues one message. An oversized payload is rejected and the
    /// segment is left untouched.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let segment = self.segment(ChannelMode::Send)?;
        let mut state = segment.state.lock();
        if state.closed {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        let free = segment
            .capacity
            .saturating_sub(state.bytes.len())
            .saturating_sub(FRAME_HEADER);
        let len = u32::try_from(payload.len()).map_err(|_| ChannelError::Overflow {
            len: payload.len(),
            free,
        })?;
        if payload.len() > free {
            return Err(ChannelError::Overflow {
                len: payload.len(),
                free,
            });
        }
        state.bytes.extend(len.to_le_bytes());
        state.bytes.extend(payload);
        Ok(())
    }

    /// Takes the next pending message, or `None` when nothing is queued.
    pub fn read(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let segment = self.segment(ChannelMode::Receive)?;
        let mut state = segment.state.lock();
        if state.closed {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        if state.bytes.len() < FRAME_HEADER {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER];
        for (slot, b) in header.iter_mut().zip(state.bytes.drain(..FRAME_HEADER)) {
            *slot = b;
        }
        let len = u32::from_le_bytes(header) as usize;
        Ok(Some(state.bytes.drain(..len).collect()))
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}
