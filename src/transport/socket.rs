//! Socket transport for telnet callers
//!
//! The BBS host accepts the caller and hands the door an already-connected
//! socket handle (DOOR32.SYS comm type 2). The door borrows that handle: it is
//! never closed on drop, so the host can keep using it after the door exits.
//!
//! Pending bytes are measured with a zero-timeout poll plus FIONREAD, so the
//! pumps never block on receive. A socket that polls readable with nothing to
//! read has been closed by the peer.

use super::{not_connected, Transport};
use crate::error::{DoorError, Result};
use socket2::{SockRef, Type};
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::net::TcpStream;
use tracing::{debug, info};

/// OS-level socket handle as passed in a drop file
#[cfg(unix)]
pub type RawSocketHandle = std::os::fd::RawFd;

/// OS-level socket handle as passed in a drop file
#[cfg(windows)]
pub type RawSocketHandle = std::os::windows::io::RawSocket;

/// Socket transport over a connected stream socket
pub struct SocketTransport {
    stream: ManuallyDrop<TcpStream>,
    /// Close the handle on drop (only for streams we were given by value)
    owns_handle: bool,
    alive: bool,
}

impl SocketTransport {
    /// Borrow a connected socket handle owned by the host process
    ///
    /// The handle is switched to blocking mode and left open on drop.
    ///
    /// # Safety
    ///
    /// `handle` must be an open socket that stays valid for the lifetime of
    /// the returned transport, and nothing else may close it meanwhile.
    ///
    /// # Errors
    ///
    /// `SocketHandle` if the handle is not a stream socket (e.g. the host
    /// already closed it and the number was reused, or it never was a socket).
    pub unsafe fn from_raw_handle(handle: RawSocketHandle) -> Result<Self> {
        #[cfg(unix)]
        let stream = {
            use std::os::fd::FromRawFd;
            unsafe { TcpStream::from_raw_fd(handle) }
        };
        #[cfg(windows)]
        let stream = {
            use std::os::windows::io::FromRawSocket;
            use windows::Win32::Networking::WinSock::{WSAStartup, WSADATA};

            // Inherited sockets arrive before std has initialized Winsock
            let mut data = WSADATA::default();
            // SAFETY: WSAStartup only writes the provided WSADATA; calls are refcounted
            unsafe { WSAStartup(0x0202, &mut data) };
            unsafe { TcpStream::from_raw_socket(handle) }
        };

        let transport = Self {
            stream: ManuallyDrop::new(stream),
            owns_handle: false,
            alive: true,
        };
        transport
            .prepare()
            .map_err(|source| DoorError::SocketHandle {
                handle: handle as i64,
                source,
            })?;
        Ok(transport)
    }

    /// Take ownership of a connected stream; it is closed on drop
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let handle = raw_handle(&stream);
        let transport = Self {
            stream: ManuallyDrop::new(stream),
            owns_handle: true,
            alive: true,
        };
        transport
            .prepare()
            .map_err(|source| DoorError::SocketHandle {
                handle: handle as i64,
                source,
            })?;
        Ok(transport)
    }

    fn prepare(&self) -> io::Result<()> {
        let socket = SockRef::from(&*self.stream);
        if socket.r#type()? != Type::STREAM {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a stream socket",
            ));
        }
        self.stream.set_nonblocking(false)?;
        // Keystroke echo should not wait on Nagle
        let _ = self.stream.set_nodelay(true);

        info!(
            peer = ?self.stream.peer_addr().ok(),
            owned = self.owns_handle,
            "Socket transport attached"
        );
        Ok(())
    }

    fn mark_dead(&mut self, why: &str) {
        if self.alive {
            debug!("Socket transport down: {}", why);
            self.alive = false;
        }
    }
}

impl Transport for SocketTransport {
    fn available(&mut self) -> io::Result<usize> {
        if !self.alive {
            return Ok(0);
        }
        match probe(&self.stream) {
            Ok(probe) => {
                if probe.closed {
                    self.mark_dead("peer closed");
                }
                Ok(probe.pending)
            }
            Err(e) => {
                self.mark_dead("poll failed");
                Err(e)
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.alive {
            return Err(not_connected());
        }
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.mark_dead("end of stream");
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                self.mark_dead("receive failed");
                Err(e)
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.alive {
            return Err(not_connected());
        }
        self.stream.write_all(bytes).inspect_err(|_| {
            self.alive = false;
        })
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if self.owns_handle {
            // SAFETY: dropped exactly once, here
            unsafe { ManuallyDrop::drop(&mut self.stream) };
        }
    }
}

/// Result of a zero-timeout readiness check
struct Probe {
    pending: usize,
    closed: bool,
}

#[cfg(unix)]
fn raw_handle(stream: &TcpStream) -> RawSocketHandle {
    use std::os::fd::AsRawFd;
    stream.as_raw_fd()
}

#[cfg(windows)]
fn raw_handle(stream: &TcpStream) -> RawSocketHandle {
    use std::os::windows::io::AsRawSocket;
    stream.as_raw_socket()
}

#[cfg(unix)]
fn probe(stream: &TcpStream) -> io::Result<Probe> {
    let fd = raw_handle(stream);

    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: one valid pollfd, zero timeout
    if unsafe { libc::poll(&mut pfd, 1, 0) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending as *mut libc::c_int) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let readable = pfd.revents & libc::POLLIN != 0;
    let hangup = pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0;
    let pending = pending.max(0) as usize;

    Ok(Probe {
        pending,
        closed: pending == 0 && (readable || hangup),
    })
}

#[cfg(windows)]
fn probe(stream: &TcpStream) -> io::Result<Probe> {
    use windows::Win32::Networking::WinSock::{
        ioctlsocket, WSAPoll, FIONREAD, POLLERR, POLLHUP, POLLNVAL, POLLRDNORM, SOCKET,
        WSAPOLLFD,
    };

    let socket = SOCKET(raw_handle(stream) as usize);

    let mut pfd = WSAPOLLFD {
        fd: socket,
        events: POLLRDNORM,
        revents: Default::default(),
    };
    // SAFETY: one valid WSAPOLLFD, zero timeout
    if unsafe { WSAPoll(&mut pfd, 1, 0) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut pending: u32 = 0;
    // SAFETY: FIONREAD writes a single u32
    if unsafe { ioctlsocket(socket, FIONREAD, &mut pending) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let revents = pfd.revents.0;
    let readable = revents & POLLRDNORM.0 != 0;
    let hangup = revents & (POLLHUP.0 | POLLERR.0 | POLLNVAL.0) != 0;
    let pending = pending as usize;

    Ok(Probe {
        pending,
        closed: pending == 0 && (readable || hangup),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    fn wait_available(transport: &mut SocketTransport, want: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let n = transport.available().unwrap();
            if n >= want || Instant::now() > deadline {
                return n;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_available_and_receive() {
        let (server, mut client) = pair();
        let mut transport = SocketTransport::from_stream(server).unwrap();
        assert_eq!(transport.available().unwrap(), 0);

        client.write_all(b"Hello").unwrap();
        let n = wait_available(&mut transport, 5);
        assert_eq!(n, 5);

        let mut buf = [0u8; 5];
        assert_eq!(transport.receive(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"Hello");
        assert!(transport.is_alive());
    }

    #[test]
    fn test_send_reaches_peer() {
        let (server, mut client) = pair();
        let mut transport = SocketTransport::from_stream(server).unwrap();

        transport.send(b"Y\n").unwrap();

        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"Y\n");
    }

    #[test]
    fn test_peer_close_marks_dead() {
        let (server, client) = pair();
        let mut transport = SocketTransport::from_stream(server).unwrap();
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(2);
        while transport.is_alive() && Instant::now() < deadline {
            assert_eq!(transport.available().unwrap(), 0);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!transport.is_alive());
        assert!(transport.send(b"x").is_err());
    }

    #[test]
    fn test_pending_bytes_drain_before_close_is_seen() {
        let (server, mut client) = pair();
        let mut transport = SocketTransport::from_stream(server).unwrap();

        client.write_all(b"bye").unwrap();
        drop(client);

        assert_eq!(wait_available(&mut transport, 3), 3);
        let mut buf = [0u8; 3];
        assert_eq!(transport.receive(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"bye");
    }

    #[cfg(unix)]
    #[test]
    fn test_borrowed_handle_stays_open() {
        use std::os::fd::AsRawFd;

        let (server, mut client) = pair();
        let handle = server.as_raw_fd();

        // SAFETY: `server` outlives the transport
        let transport = unsafe { SocketTransport::from_raw_handle(handle) }.unwrap();
        drop(transport);

        // Still usable by its real owner
        (&server).write_all(b"ok").unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ok");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_socket_handle_rejected() {
        use std::os::fd::AsRawFd;

        let file = std::fs::File::open("/dev/null").unwrap();
        // SAFETY: `file` outlives the call; the transport never owns it
        let result = unsafe { SocketTransport::from_raw_handle(file.as_raw_fd()) };
        assert!(matches!(result, Err(DoorError::SocketHandle { .. })));
    }
}
