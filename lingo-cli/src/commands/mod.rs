pub mod about;
pub mod config;
pub mod control;
pub mod launch;
pub mod serve;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
