//! Serial transport for modem callers
//!
//! The device is opened eagerly so a bad COM port fails the session before
//! any pump starts. Reads only ever ask for what the driver already holds,
//! so the configured timeout is a safety net rather than a wait.
//!
//! The port is considered gone when:
//! - the driver reports an error on any call
//! - carrier detect drops (only when `watch_carrier` is enabled)

use super::{not_connected, Transport};
use crate::constants::SERIAL_IO_TIMEOUT_MS;
use crate::error::{DoorError, Result};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Serial transport over an opened device
pub struct SerialTransport {
    port_name: String,
    port: Box<dyn serialport::SerialPort>,
    /// Treat a dropped DCD line as a hang-up
    watch_carrier: bool,
    alive: bool,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`
    ///
    /// # Errors
    ///
    /// `SerialOpen` if the device does not exist or cannot be opened.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(SERIAL_IO_TIMEOUT_MS))
            .open()
            .map_err(|e| DoorError::SerialOpen {
                port: port_name.to_string(),
                source: io::Error::from(e),
            })?;

        info!(port = port_name, baud_rate, "Serial transport opened");

        Ok(Self {
            port_name: port_name.to_string(),
            port,
            watch_carrier: false,
            alive: true,
        })
    }

    /// Hang up when the modem drops carrier
    pub fn with_carrier_watch(mut self, enabled: bool) -> Self {
        self.watch_carrier = enabled;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn mark_dead(&mut self, why: &str) {
        if self.alive {
            debug!(port = %self.port_name, "Serial transport down: {}", why);
            self.alive = false;
        }
    }
}

impl Transport for SerialTransport {
    fn available(&mut self) -> io::Result<usize> {
        if !self.alive {
            return Ok(0);
        }
        if self.watch_carrier {
            match self.port.read_carrier_detect() {
                Ok(true) => {}
                Ok(false) => {
                    self.mark_dead("carrier lost");
                    return Ok(0);
                }
                Err(e) => {
                    self.mark_dead("carrier query failed");
                    return Err(e.into());
                }
            }
        }
        match self.port.bytes_to_read() {
            Ok(n) => Ok(n as usize),
            Err(e) => {
                self.mark_dead("driver error");
                Err(e.into())
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.alive {
            return Err(not_connected());
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                self.mark_dead("read failed");
                Err(e)
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.alive {
            return Err(not_connected());
        }
        match self.port.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.mark_dead("write failed");
                Err(e)
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Platform device name for a DOS-style COM port number
///
/// Drop files number ports from 1 (`COM1`); on Unix that is `/dev/ttyS0`.
pub fn com_port_device(number: u32) -> String {
    #[cfg(windows)]
    {
        format!("COM{}", number)
    }
    #[cfg(not(windows))]
    {
        format!("/dev/ttyS{}", number.saturating_sub(1))
    }
}
