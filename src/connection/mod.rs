//! Duplex connection between a door and its caller
//!
//! ```text
//! Transport ─► InboundPump ─► inbound ByteChannel ─► read_char()/read()
//! Transport ◄─ OutboundPump ◄─ outbound ByteChannel ◄─ write()/write_char()
//! ```
//!
//! The connection owns the transport until `start()` hands it to the pumps.
//! Both pumps share one `CancelSignal`, raised either by `disconnect()` or
//! by a pump that found the transport dead.
//!
//! # Lifecycle
//!
//! `Unstarted → Running → Disconnecting → Stopped`
//!
//! A transport death goes straight from `Running` to `Stopped` once the
//! pumps have exited.

mod cancel;
mod pump;
mod stats;

pub use cancel::CancelSignal;
pub use stats::ConnectionStats;

use self::pump::{InboundPump, OutboundPump, SharedTransport};
use crate::channel::ByteChannel;
use crate::codec::TextEncoding;
use crate::config::ConnectionConfig;
use crate::error::{DoorError, Result};
use crate::transport::{RawSocketHandle, SerialTransport, SocketTransport, Transport};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unstarted,
    Running,
    Disconnecting,
    Stopped,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable control handle for a connection
///
/// Lets code that does not own the `Connection` (time limit watchdog, signal
/// handler) hang up and observe the lifecycle.
#[derive(Clone)]
pub struct ConnectionHandle {
    inbound: ByteChannel,
    outbound: ByteChannel,
    cancel: CancelSignal,
    state: Arc<RwLock<State>>,
}

impl ConnectionHandle {
    /// Stop caring about the caller
    ///
    /// Completes both channels and raises cancellation. Queued output that the
    /// outbound pump has not sent yet is dropped. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.outbound.complete();
        self.inbound.complete();
        let first = self.cancel.cancel();

        let mut state = self.state.write();
        *state = match *state {
            State::Unstarted => State::Stopped,
            State::Running => State::Disconnecting,
            other => other,
        };

        if first {
            debug!(state = ?*state, "Disconnect requested");
        }
    }

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }
}

// =============================================================================
// Pump task
// =============================================================================

/// Completes when both pumps have exited and the transport is released
pub struct PumpTask {
    handle: JoinHandle<()>,
}

impl PumpTask {
    /// Wait for both pumps to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Connection supervisor failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Await a pump; a panic counts as transport death
async fn supervise(name: &'static str, handle: JoinHandle<()>, cancel: CancelSignal) {
    if let Err(e) = handle.await {
        error!(pump = name, "Pump aborted: {}", e);
        cancel.cancel();
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One caller session over a socket or serial transport
pub struct Connection {
    handle: ConnectionHandle,
    /// Set by writers, consumed by the outbound pump
    flush_requested: Arc<AtomicBool>,
    /// Decoded characters not yet handed out by `read_char`
    leftover: VecDeque<char>,
    encoding: TextEncoding,
    stats: Arc<ConnectionStats>,
    /// Moved into the pumps by `start()`
    transport: Option<Box<dyn Transport>>,
    idle_poll: Duration,
    max_inbound_backlog: usize,
}

impl Connection {
    /// Wrap any transport
    pub fn new(transport: impl Transport, config: &ConnectionConfig) -> Self {
        Self {
            handle: ConnectionHandle {
                inbound: ByteChannel::new(),
                outbound: ByteChannel::new(),
                cancel: CancelSignal::new(),
                state: Arc::new(RwLock::new(State::Unstarted)),
            },
            flush_requested: Arc::new(AtomicBool::new(false)),
            leftover: VecDeque::new(),
            encoding: config.encoding,
            stats: Arc::new(ConnectionStats::new()),
            transport: Some(Box::new(transport)),
            idle_poll: config.idle_poll(),
            max_inbound_backlog: config.max_inbound_backlog,
        }
    }

    /// Connection over a socket handle accepted by the BBS host
    ///
    /// The handle is borrowed, never closed.
    ///
    /// # Safety
    ///
    /// See [`SocketTransport::from_raw_handle`].
    pub unsafe fn from_socket_handle(
        handle: RawSocketHandle,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let transport = unsafe { SocketTransport::from_raw_handle(handle) }?;
        Ok(Self::new(transport, config))
    }

    /// Connection over a serial device, opened immediately
    pub fn open_serial(device: &str, baud_rate: u32, config: &ConnectionConfig) -> Result<Self> {
        let transport = SerialTransport::open(device, baud_rate)?
            .with_carrier_watch(config.serial_carrier_detect);
        Ok(Self::new(transport, config))
    }

    /// Launch both pumps on the current tokio runtime
    ///
    /// # Errors
    ///
    /// `ConnectionState` unless the connection is `Unstarted`.
    pub fn start(&mut self) -> Result<PumpTask> {
        let mut state = self.handle.state.write();
        let transport = match (*state, self.transport.take()) {
            (State::Unstarted, Some(transport)) => transport,
            (current, transport) => {
                self.transport = transport;
                return Err(DoorError::ConnectionState {
                    operation: "start",
                    state: current,
                });
            }
        };
        *state = State::Running;
        drop(state);

        let transport: SharedTransport = Arc::new(Mutex::new(transport));
        let cancel = self.handle.cancel.clone();

        let inbound = InboundPump::new(
            transport.clone(),
            self.handle.inbound.clone(),
            cancel.clone(),
            self.stats.clone(),
            self.max_inbound_backlog,
        );
        let outbound = OutboundPump::new(
            transport,
            self.handle.outbound.clone(),
            self.flush_requested.clone(),
            cancel.clone(),
            self.stats.clone(),
        );

        let idle = self.idle_poll;
        let state = self.handle.state.clone();
        let stats = self.stats.clone();
        let outbound_channel = self.handle.outbound.clone();

        info!("Connection started");

        let handle = tokio::spawn(async move {
            let inbound = supervise("inbound", tokio::spawn(inbound.run(idle)), cancel.clone());
            let outbound = supervise("outbound", tokio::spawn(outbound.run(idle)), cancel);
            tokio::join!(inbound, outbound);

            // Nothing drains outbound any more; later writes become no-ops
            outbound_channel.complete();
            *state.write() = State::Stopped;

            let (tx_rate, rx_rate) = stats.average_rates();
            info!(
                rx_bytes = stats.rx_bytes(),
                tx_bytes = stats.tx_bytes(),
                elapsed = ?stats.elapsed(),
                "Connection stopped ({:.1}/{:.1} B/s out/in)",
                tx_rate,
                rx_rate
            );
        });

        Ok(PumpTask { handle })
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Next buffered character, or `None` if nothing has arrived
    ///
    /// Never blocks.
    pub fn read_char(&mut self) -> Option<char> {
        if let Some(ch) = self.leftover.pop_front() {
            return Some(ch);
        }

        let text = self.read()?;
        let mut chars = text.chars();
        let first = chars.next()?;
        self.leftover.extend(chars);
        Some(first)
    }

    /// Everything buffered as text, or `None` if nothing has arrived
    ///
    /// Characters left over from `read_char` come back first, on their own.
    /// Never blocks.
    pub fn read(&mut self) -> Option<String> {
        if !self.leftover.is_empty() {
            return Some(self.leftover.drain(..).collect());
        }

        let result = self.handle.inbound.try_read()?;
        if result.is_empty() {
            return None;
        }

        let mut text = String::with_capacity(result.len());
        for segment in &result.segments {
            self.encoding.decode_into(segment, &mut text);
        }
        Some(text)
    }

    /// Wait for the next character
    ///
    /// Returns `None` once the connection is cancelled and nothing is left to
    /// read.
    pub async fn next_char(&mut self) -> Option<char> {
        loop {
            if let Some(ch) = self.read_char() {
                return Some(ch);
            }
            if self.handle.is_cancelled() || self.handle.inbound.is_completed() {
                return None;
            }
            tokio::select! {
                _ = self.handle.inbound.readable() => {}
                _ = self.handle.cancel.cancelled() => {}
            }
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Queue one character for the caller
    pub fn write_char(&self, ch: char) {
        self.queue(&[self.encoding.encode_char(ch)]);
    }

    /// Queue text for the caller
    ///
    /// Sent by the outbound pump on its next iteration; writes made in the
    /// same tick go out together.
    pub fn write(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(text.len());
        self.encoding.encode_into(text, &mut bytes);
        self.queue(&bytes);
    }

    fn queue(&self, bytes: &[u8]) {
        self.handle.outbound.write(bytes);
        self.flush_requested.store(true, Ordering::Release);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// See [`ConnectionHandle::disconnect`]
    pub fn disconnect(&self) {
        self.handle.disconnect();
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> State {
        self.handle.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.handle.cancel_signal()
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Pumps must not outlive the door
        self.handle.disconnect();
    }
}
