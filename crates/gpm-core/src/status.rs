//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type RmResult<T> = std::result::Result<T, RmError>;

/// Status codes surfaced by the power-transition core and its collaborators.
///
/// `InvalidArgument` and `Generic` are produced by the core itself. The remaining codes are
/// passed through unchanged from locks, device-state load/unload and the RPC layer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RmError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("generic failure")]
    Generic,
    #[error("invalid state")]
    InvalidState,
    #[error("resource busy")]
    Busy,
    #[error("operation timed out")]
    Timeout,
    #[error("operation not supported")]
    NotSupported,
    #[error("insufficient resources")]
    InsufficientResources,
    #[error("rpc failure: {0}")]
    Rpc(String),
}

impl RmError {
    /// Stable, label-friendly name of the status code.
    pub fn code(&self) -> &'static str {
        self.into()
    }
}

/// Parses the codes produced by [`RmError::code`]. `rpc:<detail>` carries a message.
impl FromStr for RmError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(detail) = s.strip_prefix("rpc:") {
            return Ok(RmError::Rpc(detail.trim().to_owned()));
        }
        match s.to_lowercase().as_str() {
            "invalid_argument" => Ok(RmError::InvalidArgument),
            "generic" => Ok(RmError::Generic),
            "invalid_state" => Ok(RmError::InvalidState),
            "busy" => Ok(RmError::Busy),
            "timeout" => Ok(RmError::Timeout),
            "not_supported" => Ok(RmError::NotSupported),
            "insufficient_resources" => Ok(RmError::InsufficientResources),
            "rpc" => Ok(RmError::Rpc(String::new())),
            other => Err(format!("unknown status code: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(RmError::InvalidArgument.code(), "invalid_argument");
        assert_eq!(RmError::Rpc("link down".into()).code(), "rpc");
        assert_eq!(RmError::Rpc("link down".into()).to_string(), "rpc failure: link down");
    }

    #[test]
    fn codes_parse_back() {
        assert_eq!("timeout".parse::<RmError>(), Ok(RmError::Timeout));
        assert_eq!(RmError::Busy.code().parse::<RmError>(), Ok(RmError::Busy));
        assert_eq!(
            "rpc: channel reset".parse::<RmError>(),
            Ok(RmError::Rpc("channel reset".into()))
        );
        assert!("exploded".parse::<RmError>().is_err());
    }
}
