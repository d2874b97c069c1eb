use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the instance lock, control channel, and daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process already owns the daemon role.
    #[error("another lingo daemon holds the instance lock ({path})")]
    LockUnavailable { path: PathBuf },

    /// No daemon answered on the control socket.
    #[error("lingo daemon is not reachable at {socket}: {reason}")]
    ChannelUnavailable { socket: PathBuf, reason: String },

    #[error("malformed control command {0:?}")]
    MalformedCommand(String),

    #[error("settings error: {0}")]
    Settings(#[from] lingo_core::SettingsError),

    #[error(transparent)]
    Engine(#[from] lingo_engine::EngineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),
}

impl DaemonError {
    /// `true` for errors that mean "no daemon is running".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DaemonError::ChannelUnavailable { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn unavailable(socket: impl Into<PathBuf>, reason: impl ToString) -> DaemonError {
    DaemonError::ChannelUnavailable {
        socket: socket.into(),
        reason: reason.to_string(),
    }
}
