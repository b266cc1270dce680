//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
//! Contracts of the RPC layer that carries allocations to the firmware resource manager.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::RmResult;

/// Resource-manager object handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#010x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Object class number understood by the firmware.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u32);

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({:#06x})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// One remote allocation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest<'a> {
    pub client: Handle,
    pub parent: Handle,
    pub object: Handle,
    pub class: ClassId,
    pub params: &'a [u8],
}

/// Remote-object allocate primitive.
pub trait RemoteAllocator: Send + Sync {
    fn alloc(&self, request: &AllocRequest<'_>) -> RmResult<()>;
}

/// Transport used by the remote allocate primitive.
pub trait RpcTransport: Send + Sync {
    fn init(&self) -> RmResult<()>;
    fn deinit(&self);
}

/// Lifecycle of the firmware-side resource-manager session.
pub trait FirmwareSession: Send + Sync {
    /// `load == true` boots the session, `false` shuts it down.
    fn init(&self, load: bool) -> RmResult<()>;
}
