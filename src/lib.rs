//! door-link - duplex connection pipeline for BBS doors
//!
//! A door talks to one remote caller through a [`connection::Connection`]:
//! an inbound pump moves bytes from the transport (telnet socket or serial
//! line) into a buffered channel the door reads characters from, and an
//! outbound pump drains what the door writes back to the transport.
//! [`door::DoorRunner`] wires this up from the host's drop file.

pub mod channel;
pub mod cli;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod door;
pub mod dropfile;
pub mod error;
pub mod logging;
pub mod transport;

pub use connection::{CancelSignal, Connection, ConnectionHandle, PumpTask, State};
pub use door::{Door, DoorRunner, EchoDoor};
pub use dropfile::{Emulation, Link, Session};
pub use error::{DoorError, Result};
pub use transport::Transport;
