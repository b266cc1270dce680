//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::GpuStateEngine;
use crate::flags::{GpuProperty, PropertySet, StateFlags};
use crate::lock::ExclusiveLock;
use crate::status::RmResult;
use crate::work_queue::WorkQueue;

/// Power-management bookkeeping kept in the device's private driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PmState {
    pub in_hibernate: bool,
}

/// GPU object bound to a device once the resource manager has attached to it.
pub struct Gpu {
    instance: u32,
    properties: PropertySet,
    state: Arc<dyn GpuStateEngine>,
}

impl Gpu {
    pub fn new(instance: u32, state: Arc<dyn GpuStateEngine>) -> Self {
        Self {
            instance,
            properties: PropertySet::new(),
            state,
        }
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub fn property(&self, property: GpuProperty) -> bool {
        self.properties.get(property)
    }

    pub fn is_gc6_entering(&self) -> bool {
        self.properties.get(GpuProperty::Gc6StateEntering)
    }

    pub fn state_load(&self, flags: StateFlags) -> RmResult<()> {
        debug!(gpu = self.instance, %flags, "gpu state load");
        self.state.state_load(self, flags)
    }

    pub fn state_unload(&self, flags: StateFlags) -> RmResult<()> {
        debug!(gpu = self.instance, %flags, "gpu state unload");
        self.state.state_unload(self, flags)
    }
}

impl std::fmt::Debug for Gpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpu")
            .field("instance", &self.instance)
            .field("properties", &self.properties.pm_snapshot())
            .finish()
    }
}

/// OS-facing handle for one device.
///
/// Holds the per-device lock and work queue, the private PM state and, once attached, the
/// GPU object. A handle without a GPU object is the console-only case.
pub struct DeviceHandle {
    name: String,
    device_lock: Arc<dyn ExclusiveLock>,
    work_queue: Arc<dyn WorkQueue>,
    pm_state: Mutex<PmState>,
    gpu: RwLock<Option<Arc<Gpu>>>,
}

impl DeviceHandle {
    pub fn new(
        name: impl Into<String>,
        device_lock: Arc<dyn ExclusiveLock>,
        work_queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            name: name.into(),
            device_lock,
            work_queue,
            pm_state: Mutex::new(PmState::default()),
            gpu: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_lock(&self) -> &dyn ExclusiveLock {
        self.device_lock.as_ref()
    }

    pub fn work_queue(&self) -> &dyn WorkQueue {
        self.work_queue.as_ref()
    }

    pub fn bind_gpu(&self, gpu: Arc<Gpu>) -> Option<Arc<Gpu>> {
        debug!(device = %self.name, gpu = gpu.instance(), "gpu bound");
        self.gpu.write().replace(gpu)
    }

    pub fn unbind_gpu(&self) -> Option<Arc<Gpu>> {
        let previous = self.gpu.write().take();
        if previous.is_some() {
            debug!(device = %self.name, "gpu unbound");
        }
        previous
    }

    pub fn gpu(&self) -> Option<Arc<Gpu>> {
        self.gpu.read().clone()
    }

    pub fn pm_state(&self) -> PmState {
        *self.pm_state.lock()
    }

    pub(crate) fn set_in_hibernate(&self, value: bool) {
        self.pm_state.lock().in_hibernate = value;
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("pm_state", &self.pm_state())
            .field("gpu", &self.gpu())
            .finish()
    }
}
