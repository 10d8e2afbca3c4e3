//! DOOR32.SYS parser
//!
//! Eleven lines, one field each:
//!
//! ```text
//! 1  comm type (0 = local, 1 = serial, 2 = telnet)
//! 2  comm handle (socket handle, or COM port number)
//! 3  baud rate
//! 4  BBS software name
//! 5  user record number
//! 6  real name
//! 7  handle/alias
//! 8  security level
//! 9  minutes remaining
//! 10 emulation (0 ASCII, 1 ANSI, 2 Avatar, 3 RIP, 4 MaxGraphics)
//! 11 node number
//! ```

use super::{expiry, read_text, DropFile, Emulation, LineReader, Link, Session};
use crate::error::{DoorError, Result};
use crate::transport::{com_port_device, RawSocketHandle};
use chrono::{DateTime, Utc};
use std::path::Path;

const FILE: &str = "DOOR32.SYS";
const MINUTES_LINE: usize = 9;

/// How the caller is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommType {
    Local,
    Serial,
    Telnet,
    Other(i64),
}

impl From<i64> for CommType {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Local,
            1 => Self::Serial,
            2 => Self::Telnet,
            other => Self::Other(other),
        }
    }
}

/// Raw DOOR32.SYS record
#[derive(Debug, Clone, PartialEq)]
pub struct Door32Sys {
    pub comm_type: CommType,
    pub comm_handle: i64,
    pub baud_rate: u32,
    pub bbs_id: String,
    pub user_id: u32,
    pub real_name: String,
    pub user_handle: String,
    pub security_level: u32,
    pub minutes_remaining: i64,
    pub emulation: Emulation,
    pub node: u32,
}

impl Door32Sys {
    pub fn parse(content: &str) -> Result<Self> {
        let mut r = LineReader::new(FILE, content);
        Ok(Self {
            comm_type: CommType::from(r.number::<i64>("comm_type")?),
            comm_handle: r.number("comm_handle")?,
            baud_rate: r.number("baud_rate")?,
            bbs_id: r.text(),
            user_id: r.number("user_id")?,
            real_name: r.text(),
            user_handle: r.text(),
            security_level: r.number("security_level")?,
            minutes_remaining: r.number("minutes_remaining")?,
            emulation: Emulation::from_door32(r.number("emulation")?),
            node: r.number("node")?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&read_text(path)?)
    }

    /// Resolve the link and build the session, starting the clock at `now`
    pub fn into_session(self, now: DateTime<Utc>) -> Result<Session> {
        let link = self.link()?;
        let expires_at = expiry(FILE, MINUTES_LINE, now, self.minutes_remaining)?;
        Ok(Session {
            user_id: Some(self.user_id),
            user_name: self.user_handle.clone(),
            real_name: self.real_name.clone(),
            bbs_name: self.bbs_id.clone(),
            emulation: self.emulation,
            node: self.node,
            expires_at,
            link,
            drop_file: DropFile::Door32Sys(self),
        })
    }

    fn link(&self) -> Result<Link> {
        match self.comm_type {
            CommType::Local => Err(DoorError::UnsupportedLink {
                file: FILE,
                reason: "local comm type".into(),
            }),
            CommType::Serial => {
                let port = u32::try_from(self.comm_handle)
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| DoorError::UnsupportedLink {
                        file: FILE,
                        reason: format!("invalid COM port {}", self.comm_handle),
                    })?;
                Ok(Link::Serial {
                    device: com_port_device(port),
                    baud_rate: self.baud_rate,
                })
            }
            CommType::Telnet => {
                let handle = RawSocketHandle::try_from(self.comm_handle).map_err(|_| {
                    DoorError::UnsupportedLink {
                        file: FILE,
                        reason: format!("socket handle {} out of range", self.comm_handle),
                    }
                })?;
                Ok(Link::Socket { handle })
            }
            CommType::Other(code) => Err(DoorError::UnsupportedLink {
                file: FILE,
                reason: format!("unknown comm type {}", code),
            }),
        }
    }
}
