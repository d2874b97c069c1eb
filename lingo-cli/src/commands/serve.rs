//! `lingo serve`: become the daemon.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use lingo_daemon::instance_lock::{BACKGROUND_LOCK_ATTEMPTS, BACKGROUND_LOCK_DELAY};
use lingo_daemon::{start_blocking, ControlClient, ControlCommand, DaemonError, DaemonOptions, InstanceLock};

use super::home;

/// Exit status of a background launch that never obtained the instance lock.
pub const LOCK_UNAVAILABLE_EXIT: u8 = 2;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Launched detached by another lingo invocation; wait briefly for the lock.
    #[arg(long)]
    pub background: bool,

    /// Present the settings surface once the daemon is up.
    #[arg(long)]
    pub show_window: bool,
}

impl ServeArgs {
    pub fn run(self, debug: bool) -> Result<ExitCode> {
        let home = home()?;

        let acquired = if self.background {
            InstanceLock::acquire_with_retry(&home, BACKGROUND_LOCK_ATTEMPTS, BACKGROUND_LOCK_DELAY)
        } else {
            InstanceLock::try_acquire(&home)
        };

        let lock = match acquired {
            Ok(lock) => lock,
            Err(DaemonError::LockUnavailable { path }) if self.background => {
                eprintln!("Error: instance lock {} is held by another lingo daemon", path.display());
                return Ok(ExitCode::from(LOCK_UNAVAILABLE_EXIT));
            }
            Err(DaemonError::LockUnavailable { .. }) => {
                // Foreground: hand the request to the daemon that already runs.
                if self.show_window {
                    let _ = ControlClient::new(&home).send(ControlCommand::Gui);
                }
                println!("lingo daemon is already running");
                return Ok(ExitCode::SUCCESS);
            }
            Err(err) => return Err(err).context("failed to acquire instance lock"),
        };

        let options = DaemonOptions {
            show_window: self.show_window,
            debug_log: debug,
        };
        start_blocking(&home, lock, options).context("daemon exited with error")?;
        Ok(ExitCode::SUCCESS)
    }
}
