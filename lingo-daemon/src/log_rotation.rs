//! Size-based rotation of the background daemon's log files.
//!
//! A background daemon's stdout/stderr are redirected into
//! `~/.lingo/logs/daemon.log` and `daemon-err.log`. Once a file reaches
//! [`RotationPolicy::max_bytes`] it is shifted to `<name>.1`, older copies
//! move up by one, and anything past [`RotationPolicy::keep`] is deleted.
//! The live file is truncated in place rather than renamed away, since the
//! daemon still holds it open as its stdout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::paths::{stderr_log_path, stdout_log_path};

/// How often the daemon checks its log sizes.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log` if it has reached the size limit. Returns `true` when a
    /// rotation happened; a missing file is not an error.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.keep == 0 {
            return Ok(false);
        }

        remove_if_present(&backup_path(log, self.keep))?;
        for n in (1..self.keep).rev() {
            let from = backup_path(log, n);
            if from.exists() {
                fs::rename(&from, backup_path(log, n + 1))?;
            }
        }

        fs::copy(log, backup_path(log, 1))?;
        fs::OpenOptions::new().write(true).open(log)?.set_len(0)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home`; failures are logged, never raised.
pub fn rotate_daemon_logs(home: &Path, policy: RotationPolicy) {
    for log in [stdout_log_path(home), stderr_log_path(home)] {
        match policy.rotate(&log) {
            Ok(true) => tracing::info!(path = %log.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %log.display(), error = %err, "log rotation failed"),
        }
    }
}

/// Periodic rotation until `shutdown` fires.
pub async fn run_rotation(home: PathBuf, policy: RotationPolicy, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                let _ = tokio::task::spawn_blocking(move || rotate_daemon_logs(&home, policy)).await;
            }
        }
    }
}

fn backup_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
