//! Control protocol and client.
//!
//! One command per connection: the client writes a single line
//! (`gui`, `quit`, `reload`, `unload` or `status`, case-insensitive) and, for
//! `status` only, reads back a multi-line UTF-8 report before the daemon
//! closes the connection.
//!
//! [`ControlClient::send`] is safe to call from synchronous code running on
//! an async executor thread: the socket exchange happens on a dedicated OS
//! thread and the caller waits on a channel with a hard deadline, so it never
//! needs the executor it is blocking to make progress.

use std::fmt;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lingo_core::BackendKind;
use lingo_engine::BackendStatus;

use crate::error::{unavailable, DaemonError};
use crate::paths::socket_path;

/// Upper bound on a whole client exchange.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest command line the daemon will read.
pub const MAX_COMMAND_BYTES: u64 = 256;

const MAX_REPLY_BYTES: u64 = 64 * 1024;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Show the settings surface.
    Gui,
    /// Shut the daemon down.
    Quit,
    /// Re-read settings from disk.
    Reload,
    /// Release the loaded model.
    Unload,
    /// Report backend readiness.
    Status,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 5] = [
        ControlCommand::Gui,
        ControlCommand::Quit,
        ControlCommand::Reload,
        ControlCommand::Unload,
        ControlCommand::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlCommand::Gui => "gui",
            ControlCommand::Quit => "quit",
            ControlCommand::Reload => "reload",
            ControlCommand::Unload => "unload",
            ControlCommand::Status => "status",
        }
    }

    /// Only `status` produces a reply.
    pub fn expects_reply(self) -> bool {
        matches!(self, ControlCommand::Status)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlCommand {
    type Err = DaemonError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw.trim();
        ControlCommand::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| DaemonError::MalformedCommand(token.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------------

/// The `status` reply.
///
/// ```text
/// Backend: foundry-local
/// Ready: true
/// Message: Ready (model cached)
/// Detail: optional extra line
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub backend: BackendKind,
    pub ready: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusReport {
    pub fn new(backend: BackendKind, status: BackendStatus) -> Self {
        Self {
            backend,
            ready: status.ready,
            message: status.message,
            detail: status.detail,
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Backend: {}\nReady: {}\nMessage: {}",
            self.backend,
            self.ready,
            one_line(&self.message)
        );
        if let Some(detail) = self.detail.as_deref().filter(|d| !d.trim().is_empty()) {
            text.push_str("\nDetail: ");
            text.push_str(&one_line(detail));
        }
        text
    }

    pub fn parse(text: &str) -> Result<Self, DaemonError> {
        let mut backend = None;
        let mut ready = None;
        let mut message = None;
        let mut detail = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Backend" => {
                    backend = Some(value.parse::<BackendKind>().map_err(DaemonError::Protocol)?)
                }
                "Ready" => ready = Some(value.eq_ignore_ascii_case("true")),
                "Message" => message = Some(value.to_string()),
                "Detail" => detail = Some(value.to_string()),
                _ => {}
            }
        }

        match (backend, ready, message) {
            (Some(backend), Some(ready), Some(message)) => Ok(Self {
                backend,
                ready,
                message,
                detail,
            }),
            _ => Err(DaemonError::Protocol(format!(
                "incomplete status reply: {text:?}"
            ))),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Fields are line-oriented; embedded newlines would break parsing.
fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sends control commands to a running daemon.
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(home: &Path) -> Self {
        Self::with_socket(socket_path(home))
    }

    pub fn with_socket(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Deliver `command`; returns the reply for commands that have one.
    ///
    /// Every transport failure, including the deadline expiring, is reported
    /// as [`DaemonError::ChannelUnavailable`].
    pub fn send(&self, command: ControlCommand) -> Result<Option<String>, DaemonError> {
        let (tx, rx) = mpsc::channel();
        let socket = self.socket.clone();
        let timeout = self.timeout;

        std::thread::Builder::new()
            .name("lingo-control-client".to_string())
            .spawn(move || {
                let _ = tx.send(exchange(&socket, command, timeout));
            })
            .map_err(|e| unavailable(&self.socket, e))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(unavailable(
                &self.socket,
                format!("no answer within {} ms", self.timeout.as_millis()),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(unavailable(&self.socket, "client thread exited"))
            }
        }
    }

    /// [`ControlClient::send`] for async callers.
    pub async fn send_async(
        &self,
        command: ControlCommand,
    ) -> Result<Option<String>, DaemonError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.send(command))
            .await
            .map_err(|e| unavailable(&self.socket, e))?
    }

    /// `true` when a daemon accepts connections on the control socket.
    /// Connects and hangs up without sending a command; a unix-socket
    /// connect never waits on the peer.
    pub fn daemon_listening(&self) -> bool {
        UnixStream::connect(&self.socket).is_ok()
    }

    /// Send `status` and parse the reply.
    pub fn status(&self) -> Result<StatusReport, DaemonError> {
        match self.send(ControlCommand::Status)? {
            Some(reply) => StatusReport::parse(&reply),
            None => Err(unavailable(&self.socket, "daemon sent no status reply")),
        }
    }
}

fn exchange(
    socket: &Path,
    command: ControlCommand,
    timeout: Duration,
) -> Result<Option<String>, DaemonError> {
    let fail = |e: std::io::Error| unavailable(socket, e);

    let mut stream = UnixStream::connect(socket).map_err(fail)?;
    stream.set_read_timeout(Some(timeout)).map_err(fail)?;
    stream.set_write_timeout(Some(timeout)).map_err(fail)?;

    stream
        .write_all(format!("{command}\n").as_bytes())
        .map_err(fail)?;
    stream.flush().map_err(fail)?;
    if !command.expects_reply() {
        return Ok(None);
    }
    stream.shutdown(Shutdown::Write).map_err(fail)?;

    let mut reply = String::new();
    (&stream)
        .take(MAX_REPLY_BYTES)
        .read_to_string(&mut reply)
        .map_err(fail)?;
    if reply.trim().is_empty() {
        return Err(unavailable(socket, "connection closed without a reply"));
    }
    Ok(Some(reply.trim_end().to_string()))
}
