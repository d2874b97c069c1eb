//! Control socket server.
//!
//! Accepts connections on `~/.lingo/lingo.sock` and hands each one to its own
//! task: read one line (bounded in size and time), parse it, dispatch it, and
//! write the reply if the command has one. A bad connection is logged and
//! closed; the accept loop never stops because of one.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::protocol::{ControlCommand, MAX_COMMAND_BYTES};

/// How long a client may take to send its command line.
pub const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `stop` waits for in-flight connections before aborting them.
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Executes parsed control commands.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Returns the reply text for commands that have one.
    async fn handle(&self, command: ControlCommand) -> Option<String>;
}

/// A running control server.
pub struct ControlServer {
    socket: PathBuf,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlServer {
    /// Bind `~/.lingo/lingo.sock` under `home` and start accepting.
    pub async fn bind(home: &Path, handler: Arc<dyn CommandHandler>) -> Result<Self, DaemonError> {
        Self::bind_at(&socket_path(home), handler).await
    }

    pub async fn bind_at(socket: &Path, handler: Arc<dyn CommandHandler>) -> Result<Self, DaemonError> {
        if let Some(parent) = socket.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        prepare_socket_for_bind(socket)?;
        let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
        set_socket_permissions(socket)?;
        tracing::info!(socket = %socket.display(), "control server listening");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            handler,
            shutdown_rx,
            socket.to_path_buf(),
        ));

        Ok(Self {
            socket: socket.to_path_buf(),
            shutdown,
            accept_task: Mutex::new(Some(task)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Stop accepting, remove the socket, and wait up to
    /// [`CONNECTION_DRAIN_TIMEOUT`] for in-flight connections.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self.accept_task.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "control accept task failed");
            }
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<dyn CommandHandler>,
    mut shutdown: watch::Receiver<bool>,
    socket: PathBuf,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    connections.spawn(handle_connection(stream, Arc::clone(&handler)));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "control accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_result(joined);
            }
        }
    }

    drop(listener);
    match fs::remove_file(&socket) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(socket = %socket.display(), error = %err, "failed to remove socket"),
    }

    let drained = tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, async {
        while let Some(joined) = connections.join_next().await {
            log_connection_result(joined);
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(remaining = connections.len(), "aborting control connections still in flight");
        connections.shutdown().await;
    }
    tracing::info!("control server stopped");
}

async fn handle_connection(stream: UnixStream, handler: Arc<dyn CommandHandler>) {
    let (reader, mut writer) = stream.into_split();

    let line = match tokio::time::timeout(COMMAND_READ_TIMEOUT, read_command(reader)).await {
        Ok(Ok(line)) => line,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "control connection read failed");
            return;
        }
        Err(_) => {
            tracing::warn!("control client sent no command in time; closing");
            return;
        }
    };

    if line.trim().is_empty() {
        tracing::debug!("control connection closed without a command");
        return;
    }
    let command = match line.parse::<ControlCommand>() {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring control connection");
            return;
        }
    };
    tracing::debug!(command = %command, "control command received");

    let Some(reply) = handler.handle(command).await else {
        return;
    };
    let written = async {
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        writer.shutdown().await
    };
    if let Err(err) = written.await {
        tracing::warn!(command = %command, error = %err, "failed to write control reply");
    }
}

/// Read up to the first newline, or to EOF, capped at [`MAX_COMMAND_BYTES`].
async fn read_command(reader: tokio::net::unix::OwnedReadHalf) -> std::io::Result<String> {
    let mut limited = BufReader::new(reader).take(MAX_COMMAND_BYTES);
    let mut buf = Vec::new();
    limited.read_until(b'\n', &mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn log_connection_result(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "control connection task failed");
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "control socket already in use: {}",
            socket.display()
        )));
    }
    tracing::warn!(socket = %socket.display(), "removing stale control socket before bind");

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
