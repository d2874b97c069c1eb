//! `lingo config`: edit `~/.lingo/settings.yaml` and nudge the daemon.

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use lingo_core::{settings, BackendKind, DeviceKind, ExecutionStrategy, Settings};
use lingo_daemon::ControlCommand;

use super::{control, home};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// General daemon settings.
    General(GeneralArgs),
    /// Translation backend and model selection.
    Model(ModelArgs),
    /// HTTP listener settings.
    Service(ServiceArgs),
    /// Print the current settings.
    Show,
}

#[derive(Args, Debug)]
pub struct GeneralArgs {
    /// Debug-level daemon logging: true|false (also 1|0, yes|no).
    #[arg(long, value_name = "BOOL", value_parser = parse_bool)]
    pub debug_logging: Option<bool>,
}

#[derive(Args, Debug)]
pub struct ModelArgs {
    /// phi-silica | foundry-local
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Model alias as published in the Foundry Local catalog.
    #[arg(long)]
    pub alias: Option<String>,

    /// power-saving | high-performance | manual
    #[arg(long)]
    pub strategy: Option<ExecutionStrategy>,

    /// Device used with the manual strategy: cpu | gpu | npu | webgpu
    #[arg(long)]
    pub device: Option<DeviceKind>,

    /// Base URL of the Foundry Local service.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Custom translation prompt (Tera syntax with `source` and `target`).
    #[arg(long, conflicts_with = "reset_prompt_template")]
    pub prompt_template: Option<String>,

    /// Go back to the built-in prompt.
    #[arg(long)]
    pub reset_prompt_template: bool,
}

#[derive(Args, Debug)]
pub struct ServiceArgs {
    /// HTTP listener port (1-65535).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Require this key from HTTP callers.
    #[arg(long, conflicts_with = "clear_api_key")]
    pub api_key: Option<String>,

    /// Allow HTTP callers without a key.
    #[arg(long)]
    pub clear_api_key: bool,
}

pub fn run(command: ConfigCommand) -> Result<ExitCode> {
    match command {
        ConfigCommand::General(args) => {
            let Some(debug) = args.debug_logging else {
                bail!("No changes: pass --debug-logging <BOOL>");
            };
            save(|s| s.general.debug_log = debug)
        }
        ConfigCommand::Model(args) => {
            if args.is_empty() {
                bail!("No changes: pass at least one of --backend, --alias, --strategy, --device, --endpoint, --prompt-template");
            }
            save(|s| args.apply(s))
        }
        ConfigCommand::Service(args) => {
            if args.port.is_none() && args.api_key.is_none() && !args.clear_api_key {
                bail!("No changes: pass --port, --api-key, or --clear-api-key");
            }
            save(|s| {
                if let Some(port) = args.port {
                    s.service.port = port;
                }
                if let Some(key) = args.api_key {
                    s.service.api_key = Some(key);
                } else if args.clear_api_key {
                    s.service.api_key = None;
                }
            })
        }
        ConfigCommand::Show => show(),
    }
}

impl ModelArgs {
    fn is_empty(&self) -> bool {
        self.backend.is_none()
            && self.alias.is_none()
            && self.strategy.is_none()
            && self.device.is_none()
            && self.endpoint.is_none()
            && self.prompt_template.is_none()
            && !self.reset_prompt_template
    }

    fn apply(self, settings: &mut Settings) {
        let model = &mut settings.model;
        if let Some(backend) = self.backend {
            model.backend = backend;
        }
        if let Some(alias) = self.alias {
            model.model_alias = alias.trim().to_string();
        }
        if let Some(strategy) = self.strategy {
            model.execution_strategy = strategy;
        }
        if let Some(device) = self.device {
            model.manual_device = device;
        }
        if let Some(endpoint) = self.endpoint {
            model.foundry_endpoint = endpoint.trim().to_string();
        }
        if let Some(template) = self.prompt_template {
            model.prompt_template = Some(template);
        } else if self.reset_prompt_template {
            model.prompt_template = None;
        }
    }
}

/// Persist the edit, then ask a running daemon to pick it up.
fn save(edit: impl FnOnce(&mut Settings)) -> Result<ExitCode> {
    let home = home()?;
    settings::update_at(&home, edit).context("failed to save settings")?;
    println!("Saved.");

    match control::send(ControlCommand::Reload) {
        Ok(true) => println!("Daemon reloaded."),
        Ok(false) => {}
        Err(err) => eprintln!("warning: {err:#}"),
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "setting")]
    key: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn show() -> Result<ExitCode> {
    let home = home()?;
    let s = settings::load_at(&home).context("failed to load settings")?;

    let rows = vec![
        row("general.debug_log", s.general.debug_log),
        row("model.backend", s.model.backend),
        row("model.model_alias", &s.model.model_alias),
        row("model.execution_strategy", s.model.execution_strategy),
        row("model.manual_device", s.model.manual_device),
        row("model.foundry_endpoint", &s.model.foundry_endpoint),
        row(
            "model.prompt_template",
            if s.model.prompt_template.is_some() { "(custom)" } else { "(built-in)" },
        ),
        row("service.port", s.service.port),
        row(
            "service.api_key",
            if s.service.api_key.is_some() { "(set)" } else { "(none)" },
        ),
    ];

    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("{}", settings::settings_path_at(&home).display());
    Ok(ExitCode::SUCCESS)
}

fn row(key: &'static str, value: impl ToString) -> SettingRow {
    SettingRow {
        key,
        value: value.to_string(),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("'{other}' is not a boolean; expected true|false, 1|0, yes|no")),
    }
}
