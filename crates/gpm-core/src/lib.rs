//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
//! Power-transition core for the GPM workspace.
//!
//! [`PowerTransitionController`] drives hibernate/standby/resume requests under the
//! API-then-device lock discipline. [`ClientObjectRegistry`] is a device engine that keeps
//! the descriptors of firmware-side client objects and re-creates them when the device
//! resumes from a PM transition.

pub mod controller;
pub mod device;
pub mod engine;
pub mod flags;
pub mod lock;
pub mod metrics;
pub mod registry;
pub mod rpc;
pub mod sequence;
pub mod status;
pub mod work_queue;

pub use controller::{PmAction, PowerTransitionController, RecoveryReport, TransitionReport};
pub use device::{DeviceHandle, Gpu, PmState};
pub use engine::{EngineList, GpuStateEngine, StateEngine};
pub use flags::{GpuProperty, PmProperties, PropertySet, StateFlags};
pub use lock::{BlockingLock, ExclusiveLock, LockGuard, LockModule};
pub use metrics::PowerMetrics;
pub use registry::{
    ClientObjectRegistry, ClientSlot, RemoteObject, SlotArray, SlotKind, SlotSnapshot,
    DEFAULT_MAX_CLIENTS,
};
pub use rpc::{AllocRequest, ClassId, FirmwareSession, Handle, RemoteAllocator, RpcTransport};
pub use sequence::{BestEffortSweep, ShortCircuit};
pub use status::{RmError, RmResult};
pub use work_queue::{DeferredWorkQueue, WorkQueue};
