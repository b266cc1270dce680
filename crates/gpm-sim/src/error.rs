//! ---
//! gpm_section: "11-simulation-test-harness"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Simulated platform for exercising power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use gpm_core::{RmError, SlotKind};
use thiserror::Error;

/// Failures while assembling a simulated platform.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid status code for fault {point}: {reason}")]
    FaultStatus { point: String, reason: String },
    #[error("unknown power action '{0}'")]
    Action(String),
    #[error("cannot seed {kind}[{index}]: {source}")]
    Seed {
        kind: SlotKind,
        index: usize,
        #[source]
        source: RmError,
    },
    #[error("engine construction failed: {0}")]
    Construct(#[source] RmError),
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}
