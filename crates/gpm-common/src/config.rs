//! ---
//! gpm_section: "01-core-functionality"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Shared primitives and utilities for the runtime."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_max_clients() -> usize {
    5
}

fn default_device_name() -> String {
    "gpu0".to_owned()
}

fn default_true() -> bool {
    true
}

/// Primary configuration object for the GPM tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "GPM_CONFIG";

    /// Load configuration from disk, respecting the `GPM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.scenario.validate(self.registry.max_clients)?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Slots per client-indexed array (roots, devices, subdevices).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_clients: default_max_clients(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            bail!("registry.max_clients must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_device_name")]
    pub device: String,
    #[serde(default)]
    pub gpu_instance: u32,
    /// Bind a GPU object to the device. With `false` every transition is a no-op success.
    #[serde(default = "default_true")]
    pub bind_gpu: bool,
    #[serde(default)]
    pub gc6_entering: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            device: default_device_name(),
            gpu_instance: 0,
            bind_gpu: true,
            gc6_entering: false,
        }
    }
}

/// Kinds of tracked client objects, as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Root,
    Device,
    Subdevice,
    Display,
    DisplaySoftware,
}

impl ObjectKind {
    pub fn is_singleton(self) -> bool {
        matches!(self, ObjectKind::Display | ObjectKind::DisplaySoftware)
    }
}

/// One client object recorded in the registry before the scenario runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub kind: ObjectKind,
    #[serde(default)]
    pub index: usize,
    pub client: u32,
    pub parent: u32,
    pub object: u32,
    pub class: u32,
    /// Allocation parameters as a hex string.
    #[serde(default)]
    pub params: String,
}

impl ObjectConfig {
    pub fn params_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(self.params.trim())
            .with_context(|| format!("object {:#010x} has malformed params", self.object))
    }
}

/// Collaborator call sites that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPoint {
    ApiLock,
    DeviceLock,
    Flush,
    TransportInit,
    SessionLoad,
    SessionUnload,
    EngineLoad,
    EngineUnload,
}

/// Allocation of a specific object handle that fails during replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocFaultConfig {
    pub object: u32,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Status code returned at each fault point, e.g. `timeout` or `rpc: link down`.
    #[serde(flatten)]
    pub points: IndexMap<FaultPoint, String>,
    #[serde(default)]
    pub alloc: Vec<AllocFaultConfig>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Action names (`hibernate`, `standby`, `resume`) or raw action codes.
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, rename = "pause_between_actions_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub pause_between_actions: Duration,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
    #[serde(default)]
    pub faults: FaultConfig,
}

impl ScenarioConfig {
    pub fn validate(&self, max_clients: usize) -> Result<()> {
        let mut seen = HashSet::new();
        for object in &self.objects {
            if object.kind.is_singleton() {
                if object.index != 0 {
                    bail!(
                        "{:?} object {:#010x} must use index 0",
                        object.kind,
                        object.object
                    );
                }
            } else if object.index >= max_clients {
                bail!(
                    "{:?} object {:#010x} index {} exceeds max_clients {}",
                    object.kind,
                    object.object,
                    object.index,
                    max_clients
                );
            }
            if !seen.insert((object.kind, object.index)) {
                bail!("duplicate {:?} slot {}", object.kind, object.index);
            }
            object.params_bytes()?;
        }
        Ok(())
    }
}
