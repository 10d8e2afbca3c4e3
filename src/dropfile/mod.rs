//! Drop files and the session they describe
//!
//! The BBS host writes a drop file before launching the door. It names the
//! caller, their terminal emulation, how long they may stay, and how to reach
//! them (socket handle or serial port).
//!
//! Supported formats:
//! - `DOOR32.SYS` (socket or serial)
//! - `DOOR.SYS` (serial only)
//!
//! The format is picked from the file name, case-insensitively.

mod door32;
mod doorsys;

pub use door32::{CommType, Door32Sys};
pub use doorsys::DoorSys;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::constants::{DOOR32_SYS_FILE_NAME, DOOR_SYS_FILE_NAME};
use crate::error::{DoorError, Result};
use crate::transport::RawSocketHandle;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// =============================================================================
// Emulation
// =============================================================================

/// Terminal emulation announced by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emulation {
    #[default]
    Ascii,
    Ansi,
    Avatar,
    Rip,
    MaxGraphics,
}

impl Emulation {
    /// DOOR32.SYS emulation code; unknown codes fall back to ASCII
    pub fn from_door32(code: i64) -> Self {
        match code {
            1 => Self::Ansi,
            2 => Self::Avatar,
            3 => Self::Rip,
            4 => Self::MaxGraphics,
            _ => Self::Ascii,
        }
    }

    /// DOOR.SYS graphics mode (`GR`, `NG`, `7E`, `RIP`)
    pub fn from_graphics_mode(mode: &str) -> Self {
        match mode.trim().to_ascii_uppercase().as_str() {
            "GR" => Self::Ansi,
            "RIP" => Self::Rip,
            _ => Self::Ascii,
        }
    }

    /// Whether ANSI escape sequences are understood
    pub fn supports_ansi(self) -> bool {
        !matches!(self, Self::Ascii)
    }
}

// =============================================================================
// Link
// =============================================================================

/// How to reach the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Connected socket owned by the host
    Socket { handle: RawSocketHandle },
    /// Serial device and line speed
    Serial { device: String, baud_rate: u32 },
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket { handle } => write!(f, "socket #{}", handle),
            Self::Serial { device, baud_rate } => write!(f, "{} @ {} baud", device, baud_rate),
        }
    }
}

// =============================================================================
// Drop file kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropFileKind {
    Door32Sys,
    DoorSys,
}

impl DropFileKind {
    /// Format implied by the file name, if any
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.eq_ignore_ascii_case(DOOR32_SYS_FILE_NAME) {
            Some(Self::Door32Sys)
        } else if name.eq_ignore_ascii_case(DOOR_SYS_FILE_NAME) {
            Some(Self::DoorSys)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Door32Sys => "DOOR32.SYS",
            Self::DoorSys => "DOOR.SYS",
        }
    }
}

/// Parsed drop file record kept with the session
#[derive(Debug, Clone, PartialEq)]
pub enum DropFile {
    Door32Sys(Door32Sys),
    DoorSys(DoorSys),
}

// =============================================================================
// Session
// =============================================================================

/// Immutable description of the caller's session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Option<u32>,
    /// Handle/alias shown to other users
    pub user_name: String,
    pub real_name: String,
    pub bbs_name: String,
    pub emulation: Emulation,
    pub node: u32,
    pub expires_at: DateTime<Utc>,
    pub link: Link,
    pub drop_file: DropFile,
}

impl Session {
    /// Read and parse a drop file
    ///
    /// # Errors
    ///
    /// - `UnrecognizedDropFile` - file name is not a known format
    /// - `DropFileRead` - file cannot be read
    /// - `DropFileParse` / `UnsupportedLink` - contents unusable
    pub fn from_drop_file(path: &Path) -> Result<Self> {
        let kind = DropFileKind::detect(path).ok_or_else(|| DoorError::UnrecognizedDropFile {
            path: path.to_path_buf(),
        })?;

        let now = Utc::now();
        match kind {
            DropFileKind::Door32Sys => Door32Sys::load(path)?.into_session(now),
            DropFileKind::DoorSys => DoorSys::load(path)?.into_session(now),
        }
    }

    /// Open the transport described by the drop file
    pub fn connect(&self, config: &ConnectionConfig) -> Result<Connection> {
        match &self.link {
            Link::Serial { device, baud_rate } => {
                Connection::open_serial(device, *baud_rate, config)
            }
            // SAFETY: the host keeps the socket open for as long as the door runs
            Link::Socket { handle } => unsafe { Connection::from_socket_handle(*handle, config) },
        }
    }

    /// Time left before the caller must be returned to the BBS
    pub fn time_remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }

    pub fn kind(&self) -> DropFileKind {
        match self.drop_file {
            DropFile::Door32Sys(_) => DropFileKind::Door32Sys,
            DropFile::DoorSys(_) => DropFileKind::DoorSys,
        }
    }
}

/// `now` plus the minutes left; negative counts as none
///
/// A count too large for a timestamp is a parse error on its line.
pub(crate) fn expiry(
    file: &'static str,
    line: usize,
    now: DateTime<Utc>,
    minutes: i64,
) -> Result<DateTime<Utc>> {
    Duration::try_minutes(minutes.max(0))
        .and_then(|left| now.checked_add_signed(left))
        .ok_or_else(|| DoorError::DropFileParse {
            file,
            line,
            field: "minutes_remaining",
            reason: format!("{} minutes is out of range", minutes),
        })
}

// =============================================================================
// Line reader
// =============================================================================

/// Drop file contents as text
///
/// Names may be CP437; invalid UTF-8 becomes replacement characters rather
/// than failing the whole session.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    let raw = std::fs::read(path).map_err(|e| DoorError::DropFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Sequential reader over a line-per-field drop file
pub(crate) struct LineReader<'a> {
    file: &'static str,
    lines: std::str::Lines<'a>,
    line: usize,
}

impl<'a> LineReader<'a> {
    pub(crate) fn new(file: &'static str, content: &'a str) -> Self {
        Self {
            file,
            lines: content.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        self.line += 1;
        self.lines.next().map(str::trim)
    }

    fn error(&self, field: &'static str, reason: impl Into<String>) -> DoorError {
        DoorError::DropFileParse {
            file: self.file,
            line: self.line,
            field,
            reason: reason.into(),
        }
    }

    /// Required numeric field
    pub(crate) fn number<T>(&mut self, field: &'static str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(line) = self.next_line() else {
            return Err(self.error(field, "missing line"));
        };
        line.parse().map_err(|e: T::Err| self.error(field, e.to_string()))
    }

    /// Text field; a missing line reads as empty
    pub(crate) fn text(&mut self) -> String {
        self.next_line().unwrap_or_default().to_string()
    }

    /// `Y`/`N` flag; anything but `Y` is false
    pub(crate) fn flag(&mut self) -> bool {
        self.next_line()
            .map(|s| s.eq_ignore_ascii_case("y"))
            .unwrap_or(false)
    }

    /// Single-character field; a missing or empty line reads as a space
    pub(crate) fn character(&mut self) -> char {
        self.next_line()
            .and_then(|s| s.chars().next())
            .unwrap_or(' ')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_kind_case_insensitive() {
        assert_eq!(
            DropFileKind::detect(Path::new("/bbs/node1/DOOR32.SYS")),
            Some(DropFileKind::Door32Sys)
        );
        assert_eq!(
            DropFileKind::detect(Path::new("door.sys")),
            Some(DropFileKind::DoorSys)
        );
        assert_eq!(DropFileKind::detect(Path::new("dorinfo1.def")), None);
        assert_eq!(DropFileKind::detect(Path::new("/")), None);
    }

    #[test]
    fn test_emulation_codes() {
        assert_eq!(Emulation::from_door32(0), Emulation::Ascii);
        assert_eq!(Emulation::from_door32(1), Emulation::Ansi);
        assert_eq!(Emulation::from_door32(4), Emulation::MaxGraphics);
        assert_eq!(Emulation::from_door32(42), Emulation::Ascii);
        assert_eq!(Emulation::from_graphics_mode("gr"), Emulation::Ansi);
        assert_eq!(Emulation::from_graphics_mode("RIP"), Emulation::Rip);
        assert_eq!(Emulation::from_graphics_mode("NG"), Emulation::Ascii);
        assert!(Emulation::Ansi.supports_ansi());
        assert!(!Emulation::Ascii.supports_ansi());
    }

    #[test]
    fn test_line_reader_fields() {
        let mut reader = LineReader::new("TEST", "42\r\n  Sysop  \nY\nn\n");
        assert_eq!(reader.number::<u32>("id").unwrap(), 42);
        assert_eq!(reader.text(), "Sysop");
        assert!(reader.flag());
        assert!(!reader.flag());
        // Past the end
        assert_eq!(reader.text(), "");
        assert_eq!(reader.character(), ' ');
        match reader.number::<u32>("late") {
            Err(DoorError::DropFileParse { line, field, .. }) => {
                assert_eq!(line, 7);
                assert_eq!(field, "late");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_drop_file_unknown_name() {
        let result = Session::from_drop_file(Path::new("chain.txt"));
        assert!(matches!(
            result,
            Err(DoorError::UnrecognizedDropFile { .. })
        ));
    }

    #[test]
    fn test_from_drop_file_missing() {
        let path = PathBuf::from("/nonexistent/door-link/door32.sys");
        assert!(matches!(
            Session::from_drop_file(&path),
            Err(DoorError::DropFileRead { .. })
        ));
    }

    #[test]
    fn test_from_drop_file_reads_door32() {
        let dir = std::env::temp_dir().join(format!("door-link-session-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("DOOR32.SYS");
        std::fs::write(
            &path,
            "2\r\n5\r\n38400\r\nMystic BBS\r\n7\r\nJane Doe\r\njdoe\r\n100\r\n30\r\n1\r\n3\r\n",
        )
        .unwrap();

        let session = Session::from_drop_file(&path).unwrap();
        assert_eq!(session.kind(), DropFileKind::Door32Sys);
        assert_eq!(session.user_name, "jdoe");
        assert_eq!(session.link, Link::Socket { handle: 5 });
        assert!(session.time_remaining() > Duration::minutes(29));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
