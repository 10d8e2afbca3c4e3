//! Tracing setup
//!
//! Logs go to stderr (the caller never sees them) and, when configured, to
//! a plain-text file as well. `RUST_LOG` overrides the level.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for door-link
///
/// Call early in main() before any logging occurs.
/// Set `verbose` to true for debug-level output. A log file that cannot be
/// opened is reported once tracing is up; stderr logging still works.
pub fn init_tracing(verbose: bool, file: Option<&Path>) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, file_error) = match file.map(open_log_file) {
        Some(Ok(f)) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(f)),
            ),
            None,
        ),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_file(false)
                .compact(),
        )
        .with(file_layer)
        .with(filter)
        .try_init();

    if let (Some(path), Some(e)) = (file, file_error) {
        tracing::warn!("Cannot open log file {}: {}", path.display(), e);
    }
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = std::env::temp_dir().join(format!("door-link-logs-{}", std::process::id()));
        let path = dir.join("nested").join("door.log");

        let file = open_log_file(&path);
        assert!(file.is_ok());
        assert!(path.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, None);
        init_tracing(true, None);
    }
}
