//! Fire-and-forget commands routed to the running daemon.

use std::process::ExitCode;

use anyhow::{Context, Result};

use lingo_daemon::{ControlClient, ControlCommand};

use super::{home, launch};

pub fn gui(debug: bool) -> Result<ExitCode> {
    let home = home()?;
    match ControlClient::new(&home).send(ControlCommand::Gui) {
        Ok(_) => {}
        Err(err) if err.is_unavailable() => {
            let pid = launch::spawn_background(&home, true, debug)?;
            println!("lingo daemon started in the background (pid {pid})");
        }
        Err(err) => return Err(err).context("failed to reach lingo daemon"),
    }
    Ok(ExitCode::SUCCESS)
}

pub fn quit() -> Result<ExitCode> {
    if send(ControlCommand::Quit)? {
        println!("lingo daemon is shutting down");
    } else {
        println!("lingo daemon is not running");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn reload() -> Result<ExitCode> {
    if send(ControlCommand::Reload)? {
        println!("Reload requested.");
    } else {
        println!("lingo daemon is not running; settings apply on next start");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn unload() -> Result<ExitCode> {
    if send(ControlCommand::Unload)? {
        println!("Unload requested.");
    } else {
        println!("lingo daemon is not running; no model is loaded");
    }
    Ok(ExitCode::SUCCESS)
}

/// `Ok(false)` when no daemon is listening.
pub(crate) fn send(command: ControlCommand) -> Result<bool> {
    let home = home()?;
    match ControlClient::new(&home).send(command) {
        Ok(_) => Ok(true),
        Err(err) if err.is_unavailable() => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to send `{command}` to lingo daemon")),
    }
}
