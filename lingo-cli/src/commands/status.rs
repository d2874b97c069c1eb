//! `lingo status`: backend readiness, from the daemon when one runs.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use lingo_core::settings;
use lingo_daemon::{ControlClient, StatusReport};

use super::home;

/// Arguments for `lingo status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    running: bool,
    #[serde(flatten)]
    report: &'a StatusReport,
}

impl StatusArgs {
    pub fn run(self) -> Result<ExitCode> {
        let home = home()?;

        let (running, report) = match ControlClient::new(&home).status() {
            Ok(report) => (true, report),
            Err(err) if err.is_unavailable() => (false, standalone_status(&home)?),
            Err(err) => return Err(err).context("failed to query lingo daemon status"),
        };

        if self.json {
            let payload = StatusJson { running, report: &report };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
        } else {
            print_human(running, &report);
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// Ask the configured backend for its state from this process without loading a model.
fn standalone_status(home: &Path) -> Result<StatusReport> {
    let settings = settings::load_at(home).context("failed to load settings")?;
    let router = lingo_engine::router_from_settings(&settings);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start status runtime")?;
    let status = runtime.block_on(router.status());
    Ok(StatusReport::new(router.kind(), status))
}

fn print_human(running: bool, report: &StatusReport) {
    let daemon = if running {
        "running".green()
    } else {
        "not running".yellow()
    };
    let ready = if report.ready {
        "true".green()
    } else {
        "false".red()
    };

    println!("Daemon: {daemon}");
    println!("Backend: {}", report.backend);
    println!("Ready: {ready}");
    println!("Message: {}", report.message);
    if let Some(detail) = report.detail.as_deref() {
        println!("Detail: {detail}");
    }
}
