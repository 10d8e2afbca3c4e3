//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Pumps
// =============================================================================

/// Idle sleep between pump polls when nothing moved (milliseconds)
///
/// Zero turns the pumps into pure `yield_now` loops.
pub const DEFAULT_IDLE_POLL_MS: u64 = 1;

/// Largest chunk the inbound pump pulls from a transport in one iteration
pub const MAX_RECEIVE_CHUNK: usize = 16 * 1024;

/// Unread inbound bytes tolerated before the caller is dropped
pub const DEFAULT_MAX_INBOUND_BACKLOG: usize = 1024 * 1024;

// =============================================================================
// Serial
// =============================================================================

/// Read/write timeout for serial devices (milliseconds)
pub const SERIAL_IO_TIMEOUT_MS: u64 = 50;

// =============================================================================
// Drop files
// =============================================================================

/// DOOR32.SYS file name (matched case-insensitively)
pub const DOOR32_SYS_FILE_NAME: &str = "door32.sys";

/// DOOR.SYS file name (matched case-insensitively)
pub const DOOR_SYS_FILE_NAME: &str = "door.sys";

// =============================================================================
// Process
// =============================================================================

/// Door ran and returned normally
pub const EXIT_OK: i32 = 0;

/// No drop file could be linked to a connection
pub const EXIT_NO_SESSION: i32 = 1;

/// Door callback failed
pub const EXIT_DOOR_FAILED: i32 = 2;

/// Config file name looked up next to the executable
pub const CONFIG_FILE_NAME: &str = "door-link.toml";
