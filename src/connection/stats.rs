//! Traffic statistics for a connection
//!
//! Lock-free counters updated by the pumps and read by anyone holding the
//! connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Byte counters for one caller session
pub struct ConnectionStats {
    /// Total bytes sent to the caller
    tx_total: AtomicU64,
    /// Total bytes received from the caller
    rx_total: AtomicU64,
    /// Connection creation time
    start_time: Instant,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Add bytes sent to the transport
    #[inline]
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Add bytes received from the transport
    #[inline]
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn tx_bytes(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rx_bytes(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average (tx, rx) throughput over the connection lifetime in bytes/sec
    pub fn average_rates(&self) -> (f64, f64) {
        let secs = self.elapsed().as_secs_f64();
        if secs <= f64::EPSILON {
            return (0.0, 0.0);
        }
        (self.tx_bytes() as f64 / secs, self.rx_bytes() as f64 / secs)
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}
