//! ---
//! gpm_section: "05-external-interfaces"
//! gpm_subsection: "binary"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Control CLI for driving simulated power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use clap::Args;
use gpm_core::PmAction;
use gpm_logging::{log_system_event, SystemEventOutcome};

use crate::ConfigArgs;

#[derive(Debug, Args)]
pub struct CheckCommand {
    #[command(flatten)]
    config: ConfigArgs,
}

pub fn run(command: CheckCommand) -> Result<()> {
    let (config, source) = match command.config.load() {
        Ok(loaded) => loaded,
        Err(err) => {
            log_system_event(
                None,
                "config.check",
                &format!("{err:#}"),
                SystemEventOutcome::Fault,
            );
            return Err(err);
        }
    };

    for raw in &config.scenario.actions {
        raw.parse::<PmAction>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("scenario action '{raw}' in {}", source.display()))?;
    }

    println!("Config: {}", source.display());
    println!("Device: {}", config.power.device);
    println!("GPU bound: {}", config.power.bind_gpu);
    println!("Max clients: {}", config.registry.max_clients);
    println!("Seed objects: {}", config.scenario.objects.len());
    println!("Actions: {}", config.scenario.actions.join(", "));
    println!(
        "Faults armed: {}",
        config.scenario.faults.points.len() + config.scenario.faults.alloc.len()
    );
    log_system_event(
        None,
        "config.check",
        "configuration valid",
        SystemEventOutcome::Success,
    );
    Ok(())
}
