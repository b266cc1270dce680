//! ---
//! gpm_section: "01-core-functionality"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Shared primitives and utilities for the runtime."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
//! Shared primitives for the GPM workspace.
//! This crate exposes configuration loading and tracing bootstrap consumed by the
//! simulator and the command-line tools.

pub mod config;
pub mod logging;

pub use config::{
    AllocFaultConfig, AppConfig, FaultConfig, FaultPoint, LoadedAppConfig, LoggingConfig,
    ObjectConfig, ObjectKind, PowerConfig, RegistryConfig, ScenarioConfig,
};
pub use logging::{init_tracing, LogFormat};
