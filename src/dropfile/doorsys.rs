//! DOOR.SYS parser
//!
//! The classic 52-line GAP format. Only the first 31 lines are read; later
//! lines vary between hosts and carry nothing the connection needs.
//!
//! DOOR.SYS has no socket variant, so the link is always serial. `COM0:`
//! means a local session and is rejected.

use super::{expiry, read_text, DropFile, Emulation, LineReader, Link, Session};
use crate::error::{DoorError, Result};
use crate::transport::com_port_device;
use chrono::{DateTime, Utc};
use std::path::Path;

const FILE: &str = "DOOR.SYS";
const MINUTES_LINE: usize = 19;

/// Raw DOOR.SYS record
#[derive(Debug, Clone, PartialEq)]
pub struct DoorSys {
    pub comm_port: String,
    pub baud_rate: u32,
    pub parity: i32,
    pub node: u32,
    pub locked_baud: bool,
    pub screen_display: bool,
    pub printer: bool,
    pub page_bell: bool,
    pub caller_alarm: bool,
    pub full_name: String,
    pub calling_from: String,
    pub home_phone: String,
    pub work_phone: String,
    pub password: String,
    pub security_level: i32,
    pub times_on: i32,
    pub last_date_called: String,
    pub seconds_remaining: i64,
    pub minutes_remaining: i64,
    pub graphics_mode: String,
    pub page_length: i32,
    pub user_mode: char,
    pub registered_in: String,
    pub exit_to: String,
    pub expiration_date: String,
    pub user_record: u32,
    pub default_protocol: char,
    pub total_uploads: i32,
    pub total_downloads: i32,
    pub daily_download_k: i32,
    pub daily_download_k_limit: i32,
}

impl DoorSys {
    pub fn parse(content: &str) -> Result<Self> {
        let mut r = LineReader::new(FILE, content);
        Ok(Self {
            comm_port: r.text(),
            baud_rate: r.number("baud_rate")?,
            parity: r.number("parity")?,
            node: r.number("node")?,
            locked_baud: r.flag(),
            screen_display: r.flag(),
            printer: r.flag(),
            page_bell: r.flag(),
            caller_alarm: r.flag(),
            full_name: r.text(),
            calling_from: r.text(),
            home_phone: r.text(),
            work_phone: r.text(),
            password: r.text(),
            security_level: r.number("security_level")?,
            times_on: r.number("times_on")?,
            last_date_called: r.text(),
            seconds_remaining: r.number("seconds_remaining")?,
            minutes_remaining: r.number("minutes_remaining")?,
            graphics_mode: r.text(),
            page_length: r.number("page_length")?,
            user_mode: r.character(),
            registered_in: r.text(),
            exit_to: r.text(),
            expiration_date: r.text(),
            user_record: r.number("user_record")?,
            default_protocol: r.character(),
            total_uploads: r.number("total_uploads")?,
            total_downloads: r.number("total_downloads")?,
            daily_download_k: r.number("daily_download_k")?,
            daily_download_k_limit: r.number("daily_download_k_limit")?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&read_text(path)?)
    }

    /// Resolve the serial device and build the session, starting the clock at `now`
    pub fn into_session(self, now: DateTime<Utc>) -> Result<Session> {
        let device = self.device()?;
        let expires_at = expiry(FILE, MINUTES_LINE, now, self.minutes_remaining)?;
        Ok(Session {
            user_id: Some(self.user_record),
            user_name: self.full_name.clone(),
            real_name: self.full_name.clone(),
            bbs_name: String::new(),
            emulation: Emulation::from_graphics_mode(&self.graphics_mode),
            node: self.node,
            expires_at,
            link: Link::Serial {
                device,
                baud_rate: self.baud_rate,
            },
            drop_file: DropFile::DoorSys(self),
        })
    }

    /// Device for the comm port line
    ///
    /// `COMn:` maps to the platform's name for port n; anything else is taken
    /// as a device path.
    fn device(&self) -> Result<String> {
        let port = self.comm_port.trim().trim_end_matches(':');
        if port.is_empty() {
            return Err(DoorError::UnsupportedLink {
                file: FILE,
                reason: "no comm port".into(),
            });
        }

        let number = port
            .get(..3)
            .filter(|prefix| prefix.eq_ignore_ascii_case("com"))
            .and_then(|_| port[3..].parse::<u32>().ok());

        match number {
            Some(0) => Err(DoorError::UnsupportedLink {
                file: FILE,
                reason: "local session (COM0)".into(),
            }),
            Some(n) => Ok(com_port_device(n)),
            None => Ok(port.to_string()),
        }
    }
}
