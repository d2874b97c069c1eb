//! Single-instance lock.
//!
//! The daemon role belongs to whichever process holds an exclusive `flock`
//! on `~/.lingo/run/lingo.lock`. The kernel drops the lock when the holder
//! exits, so a crashed daemon never leaves a stale lock behind. Locks taken
//! through separate `open` calls conflict even inside one process.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{io_err, DaemonError};
use crate::paths::lock_path;

/// Attempts made by a background daemon while a predecessor shuts down.
pub const BACKGROUND_LOCK_ATTEMPTS: u32 = 30;
pub const BACKGROUND_LOCK_DELAY: Duration = Duration::from_millis(100);

/// Proof of exclusive ownership of the daemon role. Released on drop.
pub struct InstanceLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock").field("path", &self.path).finish()
    }
}

impl InstanceLock {
    /// Try once to take the lock under `home`.
    pub fn try_acquire(home: &Path) -> Result<Self, DaemonError> {
        Self::try_acquire_at(&lock_path(home))
    }

    /// Try once to take the lock file at `path`, creating it if needed.
    pub fn try_acquire_at(path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| io_err(path, e))?;

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(DaemonError::LockUnavailable {
                    path: path.to_path_buf(),
                });
            }
            Err((_, errno)) => return Err(io_err(path, std::io::Error::from(errno))),
        };

        record_pid(&lock).map_err(|e| io_err(path, e))?;
        Ok(Self {
            _lock: lock,
            path: path.to_path_buf(),
        })
    }

    /// Retry [`InstanceLock::try_acquire`] while the lock is held elsewhere.
    /// Other errors are returned immediately.
    pub fn acquire_with_retry(
        home: &Path,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, DaemonError> {
        let mut attempt = 1;
        loop {
            match Self::try_acquire(home) {
                Err(DaemonError::LockUnavailable { .. }) if attempt < attempts => {
                    attempt += 1;
                    sleep(delay);
                }
                other => return other,
            }
        }
    }

    /// `true` when some process currently holds the lock under `home`.
    ///
    /// Answers by briefly taking the lock, so a daemon starting at the same
    /// moment can lose it. Launch paths use
    /// [`ControlClient::daemon_listening`](crate::ControlClient::daemon_listening).
    pub fn is_held(home: &Path) -> bool {
        matches!(
            Self::try_acquire(home),
            Err(DaemonError::LockUnavailable { .. })
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Leave the owner's pid in the file for anyone inspecting it by hand.
fn record_pid(mut file: &File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}
