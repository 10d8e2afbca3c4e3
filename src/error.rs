//! Centralized error types for door-link
//!
//! All construction-time and bootstrap failures are represented by `DoorError`.
//! A transport dying mid-session is *not* an error value: the pumps turn it
//! into cancellation (see `connection::CancelSignal`).
//!
//! Use `Result<T>` as shorthand for `std::result::Result<T, DoorError>`.

use crate::connection::State;
use std::fmt;
use std::path::PathBuf;

/// All door-link errors
#[derive(Debug)]
pub enum DoorError {
    // === Transport ===
    /// Failed to open serial device
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Socket handle handed over by the host is unusable
    SocketHandle {
        handle: i64,
        source: std::io::Error,
    },

    // === Drop files ===
    /// Drop file could not be read
    DropFileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Drop file line could not be parsed
    DropFileParse {
        file: &'static str,
        line: usize,
        field: &'static str,
        reason: String,
    },
    /// File name is not a known drop file format
    UnrecognizedDropFile { path: PathBuf },
    /// Drop file asks for a link type we cannot drive
    UnsupportedLink { file: &'static str, reason: String },
    /// None of the candidate drop files produced a connection
    NoSession { tried: usize },

    // === Config ===
    /// Config file could not be read
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Lifecycle ===
    /// Operation not allowed in the connection's current state
    ConnectionState { operation: &'static str, state: State },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
}

impl std::error::Error for DoorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SerialOpen { source, .. }
            | Self::SocketHandle { source, .. }
            | Self::DropFileRead { source, .. }
            | Self::ConfigRead { source, .. }
            | Self::Runtime { source } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for DoorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialOpen { port, source } => {
                write!(f, "Cannot open serial port {}: {}", port, source)
            }
            Self::SocketHandle { handle, source } => {
                write!(f, "Socket handle {} is not usable: {}", handle, source)
            }
            Self::DropFileRead { path, .. } => {
                write!(f, "Cannot read drop file: {}", path.display())
            }
            Self::DropFileParse {
                file,
                line,
                field,
                reason,
            } => write!(f, "{} line {} ({}): {}", file, line, field, reason),
            Self::UnrecognizedDropFile { path } => {
                write!(f, "Not a known drop file: {}", path.display())
            }
            Self::UnsupportedLink { file, reason } => {
                write!(f, "{} link not supported: {}", file, reason)
            }
            Self::NoSession { tried } => {
                write!(f, "No drop file could be linked ({} tried)", tried)
            }
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::ConnectionState { operation, state } => {
                write!(f, "Cannot {} connection in state {:?}", operation, state)
            }
            Self::Runtime { source } => write!(f, "Failed to create runtime: {}", source),
        }
    }
}

/// Alias for Result with DoorError
pub type Result<T> = std::result::Result<T, DoorError>;
