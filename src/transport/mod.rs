//! Transport abstraction for byte-level I/O
//!
//! Separates the medium from the connection pipeline:
//! - **Transport**: how bytes reach the caller (telnet socket, serial line)
//! - **Pumps**: when bytes move (handled by `connection::pump`)
//!
//! Transports are polled, never awaited. Every call returns promptly except
//! `send`, which is a blocking write assumed fast relative to the poll cadence.
//!
//! # Adding a new transport
//!
//! 1. Create `transport/my_transport.rs`
//! 2. Implement the `Transport` trait
//! 3. Add `pub mod my_transport;` here
//! 4. Construct a `Connection` with `Connection::new(my_transport, cfg)`

pub mod serial;
pub mod socket;

pub use serial::{com_port_device, SerialTransport};
pub use socket::{RawSocketHandle, SocketTransport};

use std::io;

/// Capability set shared by every transport
///
/// The connection pumps are written once against this trait.
///
/// # Liveness
///
/// `is_alive()` flips to `false` when the remote side is gone (socket hang-up,
/// port error, carrier lost). It never flips back. After that, `available()`
/// reports nothing and `send()` fails without touching the OS handle.
pub trait Transport: Send + 'static {
    /// Number of bytes that can be received without blocking
    fn available(&mut self) -> io::Result<usize>;

    /// Receive up to `buf.len()` bytes
    ///
    /// Only called after `available()` reported pending bytes.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole run of bytes (blocking)
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Whether the remote side is still attached
    fn is_alive(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn available(&mut self) -> io::Result<usize> {
        (**self).available()
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).receive(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is no longer alive")
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transport for pump and connection tests

    use super::Transport;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;

    #[derive(Default)]
    pub(crate) struct MockState {
        /// Arrivals; `available()` reports the front chunk only
        pub incoming: VecDeque<Vec<u8>>,
        /// Every `send` call, in order
        pub sent: Vec<Vec<u8>>,
        pub dead: bool,
        pub fail_send: bool,
        /// Once `incoming` is empty, a byte is always waiting (held key)
        pub flood: bool,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockTransport {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_incoming(&self, chunk: &[u8]) {
            self.state.lock().incoming.push_back(chunk.to_vec());
        }

        pub fn flood(&self) {
            self.state.lock().flood = true;
        }

        pub fn kill(&self) {
            self.state.lock().dead = true;
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.state.lock().sent.clone()
        }

        pub fn sent_bytes(&self) -> Vec<u8> {
            self.state.lock().sent.concat()
        }
    }

    impl Transport for MockTransport {
        fn available(&mut self) -> io::Result<usize> {
            let state = self.state.lock();
            match state.incoming.front() {
                Some(front) => Ok(front.len()),
                None if state.flood => Ok(1),
                None => Ok(0),
            }
        }

        fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.state.lock();
            let flood = state.flood;
            let Some(front) = state.incoming.front_mut() else {
                if flood && !buf.is_empty() {
                    buf[0] = b'x';
                    return Ok(1);
                }
                return Ok(0);
            };
            let n = buf.len().min(front.len());
            buf[..n].copy_from_slice(&front[..n]);
            front.drain(..n);
            if front.is_empty() {
                state.incoming.pop_front();
            }
            Ok(n)
        }

        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            let mut state = self.state.lock();
            if state.fail_send {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "send failed"));
            }
            state.sent.push(bytes.to_vec());
            Ok(())
        }

        fn is_alive(&self) -> bool {
            !self.state.lock().dead
        }
    }
}
