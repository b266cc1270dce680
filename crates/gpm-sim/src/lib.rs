//! ---
//! gpm_section: "11-simulation-test-harness"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Simulated platform for exercising power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
//! Simulated collaborators for the power-transition core.
//!
//! Every collaborator writes to a shared [`Journal`] so tests and the CLI can inspect the
//! exact call order, and consults a shared [`FaultPlan`] so any call site can be made to fail.

pub mod collaborators;
pub mod error;
pub mod faults;
pub mod journal;
pub mod platform;

pub use collaborators::{FaultyEngine, JournalingQueue, RecordingLock, SimFirmware};
pub use error::SimError;
pub use faults::FaultPlan;
pub use journal::{Journal, JournalEntry, SimEvent};
pub use platform::{SimulatedPlatform, SimulatedPlatformBuilder, SIM_ENGINE};
