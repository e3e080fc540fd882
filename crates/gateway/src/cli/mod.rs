//! Command-line interface.

pub mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fame_domain::config::Config;
use fame_domain::error::Result;

#[derive(Parser)]
#[command(name = "fame", about = "FAME orchestrator gateway", version)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, default_value = "fame.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway (default).
    Serve,
    /// Config inspection commands.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the config file and report issues.
    Validate,
    /// Print the effective config (file + env overrides).
    Show,
}

/// Load config from the given path (missing file = defaults) and apply
/// `FAME_*` env overrides.
pub fn load_config(path: &PathBuf) -> Result<Config> {
    let config = Config::load(path)?;
    if path.exists() {
        tracing::info!(path = %path.display(), "config loaded");
    } else {
        tracing::info!(path = %path.display(), "no config file, using defaults");
    }
    Ok(config)
}
