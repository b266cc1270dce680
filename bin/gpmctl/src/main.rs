//! ---
//! gpm_section: "05-external-interfaces"
//! gpm_subsection: "binary"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Control CLI for driving simulated power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gpm_common::AppConfig;
use gpm_logging as logging;

mod check;
mod scenario;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "GPU power-transition simulator and registry inspector",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a simulated device from the configuration and run power transitions.
    Run(scenario::RunCommand),
    /// Parse and validate a configuration file.
    CheckConfig(check::CheckCommand),
    /// Print the client-object registry, optionally after running transitions.
    ShowRegistry(scenario::ShowRegistryCommand),
}

/// Shared option for locating the configuration file.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Configuration file. Falls back to `GPM_CONFIG`, then `configs/gpm.toml`.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<(AppConfig, PathBuf)> {
        if let Some(path) = &self.config {
            // An explicit path wins over the environment override.
            let config = AppConfig::from_path(path)?;
            return Ok((config, path.clone()));
        }
        let candidates = [PathBuf::from("configs/gpm.toml"), PathBuf::from("gpm.toml")];
        let loaded = AppConfig::load_with_source(&candidates)?;
        Ok((loaded.config, loaded.source))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        // `run` configures tracing from the loaded config file.
        Commands::Run(cmd) => scenario::run(cmd)?,
        Commands::CheckConfig(cmd) => {
            logging::init_stderr();
            check::run(cmd)?
        }
        Commands::ShowRegistry(cmd) => {
            logging::init_stderr();
            scenario::show_registry(cmd)?
        }
    }
    Ok(())
}
