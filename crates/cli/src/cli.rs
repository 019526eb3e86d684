use clap::{Parser, Subcommand};

use pw_domain::config::Config;
use pw_domain::{Error, Result};

/// policywatch — immigration policy change monitoring.
#[derive(Debug, Parser)]
#[command(name = "policywatch", version, about)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "policywatch.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daily cadence once and exit.
    RunDaily,
    /// Run the weekly cadence once and exit.
    RunWeekly,
    /// Load sources and subscriptions from a TOML seed file.
    Seed {
        /// Path to the seed file.
        path: String,
    },
    /// List monitored sources with their failure counters.
    Sources,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration file and report issues.
    Validate,
}

/// Load the config file, tolerating a missing file by falling back to
/// defaults (everything has a default; the file only overrides).
pub fn load_config(path: &str) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let config: Config = toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("failed to parse {path}: {e}")))?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "no config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(Error::Io(e)),
    }
}
