//! Door runner
//!
//! Links a session from the first usable drop file, starts the connection,
//! hands both to the door and tears everything down afterwards:
//!
//! 1. `link()` tries each candidate drop file in order
//! 2. `Connection::start()` launches the pumps
//! 3. The door runs until it returns, the caller's time runs out, or the
//!    process is asked to stop
//! 4. Disconnect, then wait for both pumps to exit
//!
//! The returned exit code tells the BBS host what happened (see `constants`).

use crate::config::Config;
use crate::connection::Connection;
use crate::constants::{EXIT_DOOR_FAILED, EXIT_NO_SESSION, EXIT_OK};
use crate::dropfile::Session;
use crate::error::{DoorError, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

// =============================================================================
// Door
// =============================================================================

/// Application logic run against a live caller
#[allow(async_fn_in_trait)]
pub trait Door {
    /// Talk to the caller until done
    ///
    /// Returning `Ok` ends the session normally; an error ends it with
    /// `EXIT_DOOR_FAILED`.
    async fn run(&mut self, session: &Session, connection: &mut Connection) -> anyhow::Result<()>;
}

/// Greets the caller and echoes keys back until `q`
///
/// Carriage return is echoed as CR LF.
#[derive(Debug, Default)]
pub struct EchoDoor;

impl Door for EchoDoor {
    async fn run(&mut self, session: &Session, connection: &mut Connection) -> anyhow::Result<()> {
        connection.write(format!("Hello, {}!", session.user_name));

        while let Some(ch) = connection.next_char().await {
            connection.write_char(ch);
            if ch == '\r' {
                connection.write_char('\n');
            }
            if ch == 'q' {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Why the door stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Finished,
    TimeLimit,
    Signal,
}

pub struct DoorRunner {
    config: Config,
    drop_files: Vec<PathBuf>,
}

impl DoorRunner {
    pub fn new(config: Config) -> Self {
        let drop_files = config.door.drop_files.clone();
        Self { config, drop_files }
    }

    /// Replace the configured drop file candidates (ignored when empty)
    pub fn with_drop_files(mut self, drop_files: Vec<PathBuf>) -> Self {
        if !drop_files.is_empty() {
            self.drop_files = drop_files;
        }
        self
    }

    pub fn drop_files(&self) -> &[PathBuf] {
        &self.drop_files
    }

    /// Session and connection from the first drop file that works
    ///
    /// # Errors
    ///
    /// `NoSession` when every candidate is missing or unusable.
    pub fn link(&self) -> Result<(Session, Connection)> {
        for path in &self.drop_files {
            let session = match Session::from_drop_file(path) {
                Ok(session) => session,
                Err(DoorError::DropFileRead { source, .. })
                    if source.kind() == ErrorKind::NotFound =>
                {
                    info!("{} not found, skipping", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("{}, skipping", e);
                    continue;
                }
            };

            match session.connect(&self.config.connection) {
                Ok(connection) => {
                    info!(
                        user = %session.user_name,
                        node = session.node,
                        link = %session.link,
                        "Linked via {}",
                        session.kind().name()
                    );
                    return Ok((session, connection));
                }
                Err(e) => warn!("{}: {}, skipping", path.display(), e),
            }
        }

        error!("No drop file could be linked, check the BBS door setup");
        Err(DoorError::NoSession {
            tried: self.drop_files.len(),
        })
    }

    /// Link, run the door, tear down; returns the process exit code
    pub async fn run<D: Door>(&self, door: D) -> i32 {
        match self.link() {
            Ok((session, connection)) => self.serve(&session, connection, door).await,
            Err(_) => EXIT_NO_SESSION,
        }
    }

    /// Run the door over an already linked connection
    pub async fn serve<D: Door>(
        &self,
        session: &Session,
        mut connection: Connection,
        mut door: D,
    ) -> i32 {
        let pumps = match connection.start() {
            Ok(pumps) => pumps,
            Err(e) => {
                error!("{}", e);
                return EXIT_DOOR_FAILED;
            }
        };

        let time_limit = self
            .config
            .door
            .enforce_time_limit
            .then(|| session.time_remaining().to_std().unwrap_or(Duration::ZERO));

        let outcome = tokio::select! {
            result = door.run(session, &mut connection) => result.map(|_| Ending::Finished),
            _ = time_limit_reached(time_limit) => Ok(Ending::TimeLimit),
            _ = shutdown_signal() => Ok(Ending::Signal),
        };

        connection.disconnect();
        pumps.join().await;

        match outcome {
            Ok(ending) => {
                info!(?ending, "Door session ended");
                EXIT_OK
            }
            Err(e) => {
                error!("Door stopped due to error: {:#}", e);
                EXIT_DOOR_FAILED
            }
        }
    }
}

async fn time_limit_reached(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Resolves when the host asks the door to stop
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        );
        let (mut sigterm, mut sigint, mut sighup) = match handlers {
            (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                warn!("Cannot install signal handlers: {}", e);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sighup.recv() => {},
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dropfile::Door32Sys;
    use crate::transport::mock::MockTransport;
    use chrono::Utc;

    fn session(minutes: u32) -> Session {
        let content = format!(
            "2\r\n9\r\n38400\r\nTest BBS\r\n1\r\nJane Doe\r\njdoe\r\n10\r\n{}\r\n1\r\n1\r\n",
            minutes
        );
        Door32Sys::parse(&content)
            .unwrap()
            .into_session(Utc::now())
            .unwrap()
    }

    fn connection(mock: &MockTransport) -> Connection {
        let mut config = Config::default();
        config.connection.idle_poll_ms = 1;
        Connection::new(mock.clone(), &config.connection)
    }

    struct Failing;

    impl Door for Failing {
        async fn run(&mut self, _: &Session, _: &mut Connection) -> anyhow::Result<()> {
            anyhow::bail!("door data missing")
        }
    }

    struct Forever;

    impl Door for Forever {
        async fn run(&mut self, _: &Session, _: &mut Connection) -> anyhow::Result<()> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_with_drop_files_overrides_config() {
        let runner = DoorRunner::new(Config::default());
        assert_eq!(runner.drop_files().len(), 2);

        let runner = runner.with_drop_files(vec![PathBuf::from("/bbs/DOOR32.SYS")]);
        assert_eq!(runner.drop_files(), &[PathBuf::from("/bbs/DOOR32.SYS")]);

        let runner = runner.with_drop_files(Vec::new());
        assert_eq!(runner.drop_files().len(), 1);
    }

    #[test]
    fn test_link_without_drop_files() {
        let runner = DoorRunner::new(Config::default()).with_drop_files(vec![
            PathBuf::from("/nonexistent/door-link/door32.sys"),
            PathBuf::from("/nonexistent/door-link/door.sys"),
            PathBuf::from("notes.txt"),
        ]);
        match runner.link() {
            Err(DoorError::NoSession { tried }) => assert_eq!(tried, 3),
            other => panic!("expected NoSession, got {:?}", other.map(|(s, _)| s)),
        }
    }

    #[tokio::test]
    async fn test_run_without_session_exits_1() {
        let runner = DoorRunner::new(Config::default())
            .with_drop_files(vec![PathBuf::from("/nonexistent/door-link/door32.sys")]);
        assert_eq!(runner.run(EchoDoor).await, EXIT_NO_SESSION);
    }

    #[tokio::test]
    async fn test_echo_door_session() {
        let mock = MockTransport::new();
        let runner = DoorRunner::new(Config::default());
        let session = session(60);

        mock.push_incoming(b"hi\r");
        // Quit only once the echo is on the wire; output still queued at
        // disconnect is dropped
        let typist = mock.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if typist.sent_bytes().ends_with(b"hi\r\n") {
                    typist.push_incoming(b"q");
                    break;
                }
            }
        });

        let code = tokio::time::timeout(
            Duration::from_secs(2),
            runner.serve(&session, connection(&mock), EchoDoor),
        )
        .await
        .expect("door did not finish");

        assert_eq!(code, EXIT_OK);
        let sent = String::from_utf8(mock.sent_bytes()).unwrap();
        assert!(sent.starts_with("Hello, jdoe!"), "sent: {:?}", sent);
        assert!(sent.contains("hi\r\n"), "sent: {:?}", sent);
    }

    #[tokio::test]
    async fn test_failing_door_exits_2() {
        let mock = MockTransport::new();
        let runner = DoorRunner::new(Config::default());
        let code = runner.serve(&session(60), connection(&mock), Failing).await;
        assert_eq!(code, EXIT_DOOR_FAILED);
    }

    #[tokio::test]
    async fn test_time_limit_ends_session() {
        let mock = MockTransport::new();
        let runner = DoorRunner::new(Config::default());

        let code = tokio::time::timeout(
            Duration::from_secs(2),
            runner.serve(&session(0), connection(&mock), Forever),
        )
        .await
        .expect("time limit not enforced");
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_time_limit_can_be_disabled() {
        let mock = MockTransport::new();
        let mut config = Config::default();
        config.door.enforce_time_limit = false;
        let runner = DoorRunner::new(config);

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            runner.serve(&session(0), connection(&mock), Forever),
        )
        .await;
        assert!(result.is_err());
    }
}
