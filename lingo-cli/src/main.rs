//! lingo: local translation daemon and its command-line front end.
//!
//! # Usage
//!
//! ```text
//! lingo                                   start the daemon in the background if none runs
//! lingo serve [--background] [--show-window]
//! lingo gui | quit | reload | unload
//! lingo status [--json]
//! lingo config general|model|service [flags]
//! lingo config show
//! lingo about
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, serve::ServeArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "lingo",
    version,
    about = "Local translation daemon backed by on-device language models",
    long_about = None,
)]
struct Cli {
    /// Log at debug level for this invocation.
    #[arg(long, global = true)]
    debug_log: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in this process.
    Serve(ServeArgs),

    /// Open the settings surface of the running daemon, starting one if needed.
    Gui,

    /// Ask the running daemon to shut down.
    Quit,

    /// Ask the running daemon to re-read its settings.
    Reload,

    /// Ask the running daemon to unload its model.
    Unload,

    /// Show backend readiness.
    Status(StatusArgs),

    /// Read or change persisted settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Print name, version, and description.
    About,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let debug = cli.debug_log;
    let Some(command) = cli.command else {
        return commands::launch::run(debug);
    };

    match command {
        Commands::Serve(args) => args.run(debug),
        Commands::Gui => commands::control::gui(debug),
        Commands::Quit => commands::control::quit(),
        Commands::Reload => commands::control::reload(),
        Commands::Unload => commands::control::unload(),
        Commands::Status(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::About => commands::about::run(),
    }
}
