use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;

pub fn run() -> Result<ExitCode> {
    println!("{} {}", "lingo".bold(), env!("CARGO_PKG_VERSION"));
    println!("{}", env!("CARGO_PKG_DESCRIPTION"));
    println!("License: {}", env!("CARGO_PKG_LICENSE"));
    Ok(ExitCode::SUCCESS)
}
