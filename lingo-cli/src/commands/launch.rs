//! Bare `lingo` and the detached background daemon spawn.

use std::fs::{self, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, ExitCode, Stdio};

use anyhow::{Context, Result};

use lingo_daemon::paths::{logs_dir, stderr_log_path, stdout_log_path};
use lingo_daemon::ControlClient;

use super::home;

/// Exit immediately when a daemon already answers on the control socket;
/// otherwise start one in the background. The lock is left to the spawned
/// daemon: if another instance is still starting, the spawn loses the lock
/// and exits on its own.
pub fn run(debug: bool) -> Result<ExitCode> {
    let home = home()?;
    if ControlClient::new(&home).daemon_listening() {
        println!("lingo daemon is already running");
        return Ok(ExitCode::SUCCESS);
    }

    let pid = spawn_background(&home, false, debug)?;
    println!("lingo daemon started in the background (pid {pid})");
    Ok(ExitCode::SUCCESS)
}

/// Re-run this executable as `serve --background` in its own process group,
/// appending its output to the daemon logs. Returns the child's pid.
pub fn spawn_background(home: &Path, show_window: bool, debug: bool) -> Result<u32> {
    let exe = std::env::current_exe().context("could not locate the lingo executable")?;

    let logs = logs_dir(home);
    fs::create_dir_all(&logs).with_context(|| format!("create {}", logs.display()))?;
    let open_log = |path: &Path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))
    };
    let stdout = open_log(&stdout_log_path(home))?;
    let stderr = open_log(&stderr_log_path(home))?;

    let mut command = Command::new(exe);
    command.args(["serve", "--background"]);
    if show_window {
        command.arg("--show-window");
    }
    if debug {
        command.arg("--debug-log");
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0)
        .spawn()
        .context("failed to spawn background daemon")?;
    Ok(child.id())
}
