//! Configuration management
//!
//! Config file is `door-link.toml`, stored next to the executable unless a
//! path is given on the command line. Every section is optional; missing
//! fields take their defaults.

use crate::codec::TextEncoding;
use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_IDLE_POLL_MS, DEFAULT_MAX_INBOUND_BACKLOG, DOOR32_SYS_FILE_NAME,
    DOOR_SYS_FILE_NAME,
};
use crate::error::{DoorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub door: DoorConfig,
    pub connection: ConnectionConfig,
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorConfig {
    /// Drop files tried in order when none are given on the command line
    pub drop_files: Vec<PathBuf>,
    /// Disconnect the caller when the drop file's time runs out
    pub enforce_time_limit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Wire text encoding ("ascii" or "latin1")
    pub encoding: TextEncoding,
    /// Pump sleep when idle, in milliseconds (0 = yield only)
    pub idle_poll_ms: u64,
    /// Unread inbound bytes before the caller is dropped (0 = unlimited)
    pub max_inbound_backlog: usize,
    /// Treat loss of modem carrier (DCD) as a hang-up on serial lines
    pub serial_carrier_detect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogsConfig {
    /// Debug-level output
    pub verbose: bool,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            drop_files: vec![
                PathBuf::from(DOOR32_SYS_FILE_NAME),
                PathBuf::from(DOOR_SYS_FILE_NAME),
            ],
            enforce_time_limit: true,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Ascii,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            max_inbound_backlog: DEFAULT_MAX_INBOUND_BACKLOG,
            serial_carrier_detect: false,
        }
    }
}

impl ConnectionConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Config {
    /// Reject values the pumps cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.connection.idle_poll_ms > 1000 {
            return Err(DoorError::ConfigValidation {
                field: "connection.idle_poll_ms",
                reason: format!("{} ms would make typing lag; use 0..=1000", self.connection.idle_poll_ms),
            });
        }
        Ok(())
    }
}

/// Default config file path (next to the executable)
pub fn config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| DoorError::ConfigRead {
        path: PathBuf::from("executable"),
        source: e,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| DoorError::ConfigValidation {
        field: "exe_path",
        reason: "no parent directory".into(),
    })?;
    Ok(exe_dir.join(CONFIG_FILE_NAME))
}

/// Parse and validate a config file
pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| DoorError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: Config = toml::from_str(&content).map_err(|e| DoorError::ConfigValidation {
        field: "config",
        reason: format!("{}: {}", path.display(), e),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load config, falling back to defaults when missing or invalid
///
/// An explicit `path` that cannot be read is reported; the implicit one next
/// to the executable is optional.
pub fn load(path: Option<&Path>) -> Config {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match config_path() {
            Ok(p) => (p, false),
            Err(e) => {
                warn!("Failed to determine config path: {}, using defaults", e);
                return Config::default();
            }
        },
    };

    if !explicit && !path.exists() {
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            Config::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(
            config.door.drop_files,
            vec![PathBuf::from("door32.sys"), PathBuf::from("door.sys")]
        );
        assert!(config.door.enforce_time_limit);
        assert_eq!(config.connection.encoding, TextEncoding::Ascii);
        assert_eq!(config.connection.idle_poll_ms, DEFAULT_IDLE_POLL_MS);
        assert_eq!(
            config.connection.max_inbound_backlog,
            DEFAULT_MAX_INBOUND_BACKLOG
        );
        assert!(!config.connection.serial_carrier_detect);
        assert!(!config.logs.verbose);
        assert!(config.logs.file.is_none());
    }

    #[test]
    fn test_config_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.connection.idle_poll(), Duration::from_millis(1));
        assert_eq!(config.door.drop_files.len(), 2);
    }

    #[test]
    fn test_config_partial_section() {
        let partial = r#"
[connection]
encoding = "latin1"
serial_carrier_detect = true

[door]
drop_files = ["/bbs/node1/DOOR32.SYS"]
"#;
        let config: Config = toml::from_str(partial).unwrap();

        assert_eq!(config.connection.encoding, TextEncoding::Latin1);
        assert!(config.connection.serial_carrier_detect);
        assert_eq!(config.connection.idle_poll_ms, DEFAULT_IDLE_POLL_MS);
        assert_eq!(
            config.door.drop_files,
            vec![PathBuf::from("/bbs/node1/DOOR32.SYS")]
        );
        assert!(config.door.enforce_time_limit);
    }

    #[test]
    fn test_validate_rejects_slow_poll() {
        let mut config = Config::default();
        config.connection.idle_poll_ms = 5000;
        assert!(matches!(
            config.validate(),
            Err(DoorError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_load_from_file_and_fallback() {
        let dir = std::env::temp_dir().join(format!("door-link-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        fs::write(&good, "[logs]\nverbose = true\n").unwrap();
        assert!(load_from(&good).unwrap().logs.verbose);

        let bad = dir.join("bad.toml");
        fs::write(&bad, "[connection]\nidle_poll_ms = \"fast\"\n").unwrap();
        assert!(load_from(&bad).is_err());
        // Falls back to defaults
        assert_eq!(load(Some(&bad)).connection.idle_poll_ms, DEFAULT_IDLE_POLL_MS);

        let missing = dir.join("missing.toml");
        assert!(matches!(
            load_from(&missing),
            Err(DoorError::ConfigRead { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
