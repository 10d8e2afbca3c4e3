//! Byte channel between a pump and the connection
//!
//! An ordered single-producer/single-consumer byte buffer:
//! - **Writer side**: `write` appends to a pending buffer, `flush` commits it
//!   as one segment, `complete` ends the channel
//! - **Reader side**: `try_read` takes every committed segment without
//!   blocking, `readable` waits for the next flush or completion
//!
//! Both sides are the same cloneable handle; the connection guarantees that
//! each channel has exactly one writer task and one reader task.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Committed bytes taken by one `try_read`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// Segments in commit order (one per `flush`)
    pub segments: Vec<Bytes>,
    /// The writer called `complete()`; nothing further will arrive
    pub is_completed: bool,
}

impl ReadResult {
    /// Total bytes across all segments
    pub fn len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(Bytes::is_empty)
    }

    /// Copy all segments into one contiguous buffer
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }
}

#[derive(Default)]
struct ChannelState {
    /// Written but not yet flushed
    pending: BytesMut,
    /// Flushed, waiting for the reader
    committed: VecDeque<Bytes>,
    committed_len: usize,
    completed: bool,
}

struct Shared {
    state: Mutex<ChannelState>,
    readable: Notify,
}

/// Ordered byte channel with explicit flush and completion
#[derive(Clone)]
pub struct ByteChannel {
    shared: Arc<Shared>,
}

impl ByteChannel {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState::default()),
                readable: Notify::new(),
            }),
        }
    }

    /// Append bytes; invisible to the reader until `flush()`
    ///
    /// No-op once the channel is complete.
    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock();
        if state.completed {
            return;
        }
        state.pending.extend_from_slice(data);
    }

    /// Commit pending bytes as one segment and wake the reader
    pub fn flush(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.completed || state.pending.is_empty() {
                return;
            }
            let segment = state.pending.split().freeze();
            state.committed_len += segment.len();
            state.committed.push_back(segment);
        }
        self.shared.readable.notify_one();
    }

    /// Mark the channel finished
    ///
    /// Unflushed bytes are discarded; committed bytes stay readable.
    pub fn complete(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.completed {
                return;
            }
            state.completed = true;
            state.pending.clear();
        }
        self.shared.readable.notify_one();
    }

    /// Take every committed segment without blocking
    ///
    /// Returns `None` when nothing is committed and the channel is still open.
    /// A completed channel always yields a result with `is_completed` set.
    pub fn try_read(&self) -> Option<ReadResult> {
        let mut state = self.shared.state.lock();
        if state.committed.is_empty() && !state.completed {
            return None;
        }
        let segments: Vec<Bytes> = state.committed.drain(..).collect();
        state.committed_len = 0;
        Some(ReadResult {
            segments,
            is_completed: state.completed,
        })
    }

    /// Wait until a flush or completion happens after the last wake-up
    pub async fn readable(&self) {
        self.shared.readable.notified().await;
    }

    pub fn is_completed(&self) -> bool {
        self.shared.state.lock().completed
    }

    /// Committed bytes not yet taken by the reader
    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().committed_len
    }
}

impl Default for ByteChannel {
    fn default() -> Self {
        Self::new()
    }
}
