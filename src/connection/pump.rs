//! Inbound and outbound pumps
//!
//! Each pump is a cooperative polling loop: yield to the scheduler, poll the
//! transport or channel once, repeat. `poll_once` is one iteration and is
//! synchronous so the transport lock is never held across an await.
//!
//! - Inbound: transport → inbound channel. After cancellation it drains at
//!   most one receive chunk more, and nothing if the channel is complete. It
//!   never waits for new bytes.
//! - Outbound: outbound channel → transport. Stops as soon as cancellation
//!   is raised or the channel completes; unsent bytes are dropped.
//!
//! Any transport error counts as transport death: the pump raises
//! cancellation and stops, and the other pump winds down on its next check.

use super::cancel::CancelSignal;
use super::stats::ConnectionStats;
use crate::channel::ByteChannel;
use crate::constants::MAX_RECEIVE_CHUNK;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace, warn};

/// Transport shared by the two pumps
pub(crate) type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Outcome of one pump iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Nothing to move
    Idle,
    /// Moved this many bytes
    Moved(usize),
    /// Pump must exit
    Finished,
}

/// Sleep between idle polls, cut short by cancellation
async fn idle_wait(idle: Duration, cancel: &CancelSignal) {
    if idle.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(idle) => {}
        _ = cancel.cancelled() => {}
    }
}

// =============================================================================
// Inbound
// =============================================================================

pub(crate) struct InboundPump {
    transport: SharedTransport,
    channel: ByteChannel,
    cancel: CancelSignal,
    stats: Arc<ConnectionStats>,
    /// Unread bytes tolerated before the caller is dropped (0 = unlimited)
    max_backlog: usize,
    /// Bytes still allowed in once cancellation was seen
    drain_budget: Option<usize>,
    buf: Vec<u8>,
}

impl InboundPump {
    pub(crate) fn new(
        transport: SharedTransport,
        channel: ByteChannel,
        cancel: CancelSignal,
        stats: Arc<ConnectionStats>,
        max_backlog: usize,
    ) -> Self {
        Self {
            transport,
            channel,
            cancel,
            stats,
            max_backlog,
            drain_budget: None,
            buf: vec![0u8; MAX_RECEIVE_CHUNK],
        }
    }

    pub(crate) fn poll_once(&mut self) -> io::Result<Step> {
        let mut limit = self.buf.len();
        if self.cancel.is_cancelled() {
            // A completed channel discards whatever we would read
            if self.channel.is_completed() {
                return Ok(Step::Finished);
            }
            limit = *self.drain_budget.get_or_insert(MAX_RECEIVE_CHUNK);
            if limit == 0 {
                return Ok(Step::Finished);
            }
        }

        let mut transport = self.transport.lock();

        let available = transport.available()?;
        if available == 0 {
            if !transport.is_alive() {
                info!("Transport closed, cancelling connection");
                self.cancel.cancel();
                return Ok(Step::Finished);
            }
            return Ok(Step::Idle);
        }

        let want = available.min(limit);
        let n = transport.receive(&mut self.buf[..want])?;
        let alive = transport.is_alive();
        drop(transport);

        if let Some(budget) = self.drain_budget.as_mut() {
            *budget = budget.saturating_sub(n);
        }

        if n > 0 {
            self.channel.write(&self.buf[..n]);
            self.channel.flush();
            self.stats.add_rx(n);
            trace!(bytes = n, "inbound");
        }

        if self.max_backlog > 0 && self.channel.buffered_len() > self.max_backlog {
            warn!(
                backlog = self.channel.buffered_len(),
                limit = self.max_backlog,
                "Inbound backlog exceeded, dropping caller"
            );
            self.cancel.cancel();
            return Ok(Step::Finished);
        }

        if !alive {
            info!("Transport closed, cancelling connection");
            self.cancel.cancel();
        }

        Ok(Step::Moved(n))
    }

    pub(crate) async fn run(mut self, idle: Duration) {
        info!("Inbound pump started");

        loop {
            tokio::task::yield_now().await;

            match self.poll_once() {
                Ok(Step::Moved(_)) => {}
                Ok(Step::Idle) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    idle_wait(idle, &self.cancel).await;
                }
                Ok(Step::Finished) => break,
                Err(e) => {
                    warn!("Inbound pump stopped on transport error: {}", e);
                    self.cancel.cancel();
                    break;
                }
            }
        }

        info!("Inbound pump stopped");
    }
}

// =============================================================================
// Outbound
// =============================================================================

pub(crate) struct OutboundPump {
    transport: SharedTransport,
    channel: ByteChannel,
    /// Set by writers; the pump flushes on their behalf
    flush_requested: Arc<AtomicBool>,
    cancel: CancelSignal,
    stats: Arc<ConnectionStats>,
}

impl OutboundPump {
    pub(crate) fn new(
        transport: SharedTransport,
        channel: ByteChannel,
        flush_requested: Arc<AtomicBool>,
        cancel: CancelSignal,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            transport,
            channel,
            flush_requested,
            cancel,
            stats,
        }
    }

    pub(crate) fn poll_once(&mut self) -> io::Result<Step> {
        if self.flush_requested.swap(false, Ordering::AcqRel) {
            self.channel.flush();
        }

        let Some(result) = self.channel.try_read() else {
            return Ok(Step::Idle);
        };

        let sent = result.len();
        if sent > 0 {
            let mut transport = self.transport.lock();
            for segment in &result.segments {
                transport.send(segment)?;
            }
            drop(transport);
            self.stats.add_tx(sent);
            trace!(bytes = sent, segments = result.segments.len(), "outbound");
        }

        if result.is_completed {
            Ok(Step::Finished)
        } else {
            Ok(Step::Moved(sent))
        }
    }

    pub(crate) async fn run(mut self, idle: Duration) {
        info!("Outbound pump started");

        while !self.cancel.is_cancelled() {
            tokio::task::yield_now().await;

            match self.poll_once() {
                Ok(Step::Moved(_)) => {}
                Ok(Step::Idle) => idle_wait(idle, &self.cancel).await,
                Ok(Step::Finished) => break,
                Err(e) => {
                    warn!("Outbound pump stopped on transport error: {}", e);
                    self.cancel.cancel();
                    break;
                }
            }
        }

        info!("Outbound pump stopped");
    }
}
