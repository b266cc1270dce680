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

use anyhow::{anyhow, Context, Result};
use clap::Args;
use gpm_common::init_tracing;
use gpm_core::{PmAction, SlotSnapshot, TransitionReport};
use gpm_metrics::{encode_text, new_registry, write_textfile};
use gpm_sim::SimulatedPlatform;
use serde::Serialize;
use tracing::info;

use crate::ConfigArgs;

#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    config: ConfigArgs,

    /// Action to run (name or raw code). Repeatable; replaces the configured scenario.
    #[arg(long = "action", value_name = "ACTION")]
    actions: Vec<PmAction>,

    /// Emit reports and the final registry as JSON.
    #[arg(long)]
    json: bool,

    /// Write the Prometheus text exposition to FILE after the run.
    #[arg(long = "metrics-out", value_name = "FILE")]
    metrics_out: Option<PathBuf>,

    /// Print the Prometheus text exposition after the run.
    #[arg(long = "print-metrics")]
    print_metrics: bool,

    /// Exit with an error when any transition returns a failure status.
    #[arg(long = "fail-on-error")]
    fail_on_error: bool,
}

#[derive(Debug, Args)]
pub struct ShowRegistryCommand {
    #[command(flatten)]
    config: ConfigArgs,

    /// Transitions to run before printing. Repeatable.
    #[arg(long = "after", value_name = "ACTION")]
    after: Vec<PmAction>,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    device: &'a str,
    reports: &'a [TransitionReport],
    registry: Vec<SlotSnapshot>,
}

pub fn run(command: RunCommand) -> Result<()> {
    let (config, source) = command.config.load()?;
    init_tracing("gpmctl", &config.logging)?;
    let metrics = new_registry();
    let platform = SimulatedPlatform::builder()
        .config(config)
        .metrics(metrics.clone())
        .build()
        .with_context(|| format!("cannot build platform from {}", source.display()))?;

    let actions = if command.actions.is_empty() {
        platform.scenario_actions()?
    } else {
        command.actions
    };
    info!(config = %source.display(), actions = actions.len(), "running scenario");
    let reports = platform.run(&actions);

    if command.json {
        let output = RunOutput {
            device: platform.device().name(),
            reports: &reports,
            registry: platform.registry().snapshot(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (step, report) in reports.iter().enumerate() {
            println!("{}", render_report(step, report));
        }
        println!("Valid slots: {}", platform.registry().valid_count());
    }

    if let Some(path) = &command.metrics_out {
        write_textfile(&metrics, path)?;
    }
    if command.print_metrics {
        print!("{}", encode_text(&metrics)?);
    }

    let failed = reports.iter().filter(|report| !report.is_ok()).count();
    if command.fail_on_error && failed > 0 {
        return Err(anyhow!("{failed} of {} transitions failed", reports.len()));
    }
    Ok(())
}

pub fn show_registry(command: ShowRegistryCommand) -> Result<()> {
    let (config, source) = command.config.load()?;
    let platform = SimulatedPlatform::from_config(config)
        .with_context(|| format!("cannot build platform from {}", source.display()))?;
    for report in platform.run(&command.after) {
        if let Some(err) = &report.error {
            eprintln!("{} returned {}", report.action, err);
        }
    }

    let snapshot = platform.registry().snapshot();
    if command.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    println!(
        "{:<17} {:>5} {:>12} {:>12} {:>12} {:>8} {:>7}",
        "KIND", "INDEX", "CLIENT", "PARENT", "OBJECT", "CLASS", "PARAMS"
    );
    for slot in &snapshot {
        println!(
            "{:<17} {:>5} {:>12} {:>12} {:>12} {:>8} {:>7}",
            slot.kind.as_str(),
            slot.index,
            slot.client.to_string(),
            slot.parent.to_string(),
            slot.object.to_string(),
            slot.class.to_string(),
            slot.params_len
        );
    }
    Ok(())
}

fn render_report(step: usize, report: &TransitionReport) -> String {
    let status = match &report.error {
        None => "ok".to_owned(),
        Some(err) => format!("error: {err}"),
    };
    let recovery = match &report.recovery {
        None => "-".to_owned(),
        Some(recovery) => match &recovery.error {
            None => "resumed".to_owned(),
            Some(err) => format!("failed ({err})"),
        },
    };
    format!(
        "#{step:<3} {:<16} {:<32} recovery={:<24} {}us",
        report.action.to_string(),
        status,
        recovery,
        report.elapsed_us
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpm_core::{PmState, RecoveryReport, RmError};

    fn report(error: Option<RmError>, recovery: Option<RecoveryReport>) -> TransitionReport {
        TransitionReport {
            device: "gpu0".into(),
            action: PmAction::Standby,
            started_at: chrono::Utc::now(),
            elapsed_us: 12,
            gpu_bound: true,
            error,
            recovery,
            pm_state: PmState::default(),
            properties: None,
        }
    }

    #[test]
    fn renders_recovery_outcome() {
        let line = render_report(
            1,
            &report(
                Some(RmError::Busy),
                Some(RecoveryReport {
                    error: Some(RmError::Generic),
                }),
            ),
        );
        assert!(line.contains("error: resource busy"));
        assert!(line.contains("failed (generic failure)"));

        let ok = render_report(0, &report(None, None));
        assert!(ok.contains(" ok "));
        assert!(ok.contains("recovery=-"));
    }
}
