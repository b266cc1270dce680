//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
//! Client-object registry for the firmware resource manager.
//!
//! The registry remembers every root, device, subdevice and display object allocated on the
//! firmware side. Across a PM transition the firmware session is torn down and rebooted, so
//! on the resume load every remembered object is allocated again, parents before children.

mod slot;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::device::Gpu;
use crate::engine::StateEngine;
use crate::flags::{GpuProperty, StateFlags};
use crate::metrics::PowerMetrics;
use crate::rpc::{FirmwareSession, Handle, RemoteAllocator, RpcTransport};
use crate::sequence::ShortCircuit;
use crate::status::{RmError, RmResult};

pub use slot::{ClientSlot, RemoteObject, SlotArray, SlotKind, SlotSnapshot};

/// Number of client indices tracked per object kind unless configured otherwise.
pub const DEFAULT_MAX_CLIENTS: usize = 5;

#[derive(Debug)]
struct SlotTables {
    roots: SlotArray,
    devices: SlotArray,
    subdevices: SlotArray,
    display: SlotArray,
    display_software: SlotArray,
}

impl SlotTables {
    fn new(max_clients: usize) -> Self {
        Self {
            roots: SlotArray::new(SlotKind::Root, max_clients),
            devices: SlotArray::new(SlotKind::Device, max_clients),
            subdevices: SlotArray::new(SlotKind::Subdevice, max_clients),
            display: SlotArray::new(SlotKind::Display, 1),
            display_software: SlotArray::new(SlotKind::DisplaySoftware, 1),
        }
    }

    fn array(&self, kind: SlotKind) -> &SlotArray {
        match kind {
            SlotKind::Root => &self.roots,
            SlotKind::Device => &self.devices,
            SlotKind::Subdevice => &self.subdevices,
            SlotKind::Display => &self.display,
            SlotKind::DisplaySoftware => &self.display_software,
        }
    }

    fn array_mut(&mut self, kind: SlotKind) -> &mut SlotArray {
        match kind {
            SlotKind::Root => &mut self.roots,
            SlotKind::Device => &mut self.devices,
            SlotKind::Subdevice => &mut self.subdevices,
            SlotKind::Display => &mut self.display,
            SlotKind::DisplaySoftware => &mut self.display_software,
        }
    }

    fn all_mut(&mut self) -> [&mut SlotArray; 5] {
        [
            &mut self.roots,
            &mut self.devices,
            &mut self.subdevices,
            &mut self.display,
            &mut self.display_software,
        ]
    }

    /// Valid slots in replay order: per index root, device, subdevice; then the singletons.
    fn replay_order(&self) -> Vec<(SlotKind, usize, RemoteObject)> {
        let mut order = Vec::new();
        for index in 0..self.roots.capacity() {
            for kind in SlotKind::PER_CLIENT {
                if let Some(object) = self.array(kind).get(index).and_then(ClientSlot::object) {
                    order.push((kind, index, object.clone()));
                }
            }
        }
        for kind in SlotKind::SINGLETONS {
            if let Some(object) = self.array(kind).get(0).and_then(ClientSlot::object) {
                order.push((kind, 0, object.clone()));
            }
        }
        order
    }
}

/// Device engine that owns the client-object tables of one GPU.
pub struct ClientObjectRegistry {
    max_clients: usize,
    tables: Mutex<SlotTables>,
    transport: Arc<dyn RpcTransport>,
    session: Arc<dyn FirmwareSession>,
    allocator: Arc<dyn RemoteAllocator>,
    metrics: Option<PowerMetrics>,
}

impl ClientObjectRegistry {
    pub fn new(
        max_clients: usize,
        transport: Arc<dyn RpcTransport>,
        session: Arc<dyn FirmwareSession>,
        allocator: Arc<dyn RemoteAllocator>,
    ) -> Self {
        let max_clients = max_clients.max(1);
        Self {
            max_clients,
            tables: Mutex::new(SlotTables::new(max_clients)),
            transport,
            session,
            allocator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PowerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Track an object the allocation path has just created on the firmware side.
    pub fn record(&self, kind: SlotKind, index: usize, object: RemoteObject) -> RmResult<()> {
        let mut tables = self.tables.lock();
        let slot = Self::slot_mut(&mut tables, kind, index)?;
        if slot.is_valid() {
            warn!(%kind, index, "slot already tracks an object");
            return Err(RmError::InvalidState);
        }
        debug!(
            %kind,
            index,
            object = %object.object,
            class = %object.class,
            "client object recorded"
        );
        slot.occupy(object);
        Ok(())
    }

    /// Forget the object in `kind[index]` after it was freed on the firmware side.
    pub fn release(&self, kind: SlotKind, index: usize) -> RmResult<RemoteObject> {
        let mut tables = self.tables.lock();
        let slot = Self::slot_mut(&mut tables, kind, index)?;
        let object = slot.object().cloned().ok_or(RmError::InvalidState)?;
        slot.invalidate();
        debug!(%kind, index, object = %object.object, "client object released");
        Ok(object)
    }

    /// Forget whichever slot tracks `handle`, returning where it lived.
    pub fn release_object(&self, handle: Handle) -> Option<(SlotKind, usize)> {
        let mut tables = self.tables.lock();
        for array in tables.all_mut() {
            let kind = array.kind();
            let found = array
                .iter_valid()
                .find(|(_, object)| object.object == handle)
                .map(|(index, _)| index);
            if let Some(index) = found {
                if let Some(slot) = array.get_mut(index) {
                    slot.invalidate();
                }
                debug!(%kind, index, object = %handle, "client object released by handle");
                return Some((kind, index));
            }
        }
        None
    }

    pub fn slot(&self, kind: SlotKind, index: usize) -> Option<ClientSlot> {
        self.tables.lock().array(kind).get(index).cloned()
    }

    pub fn is_valid(&self, kind: SlotKind, index: usize) -> bool {
        self.slot(kind, index).is_some_and(|slot| slot.is_valid())
    }

    pub fn valid_count(&self) -> usize {
        let tables = self.tables.lock();
        SlotKind::PER_CLIENT
            .into_iter()
            .chain(SlotKind::SINGLETONS)
            .map(|kind| tables.array(kind).valid_count())
            .sum()
    }

    /// Valid slots in the order a resume would replay them.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.tables
            .lock()
            .replay_order()
            .iter()
            .map(|(kind, index, object)| SlotSnapshot::new(*kind, *index, object))
            .collect()
    }

    pub fn on_construct(&self, gpu: &Gpu) -> RmResult<()> {
        debug!(gpu = gpu.instance(), "client registry constructed");
        self.transport.init()
    }

    pub fn on_state_load(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        debug!(gpu = gpu.instance(), %flags, "client registry state load");
        if !flags.is_pm_transition() {
            return Ok(());
        }

        self.transport.init().map_err(|err| {
            error!(gpu = gpu.instance(), %err, "rpc transport init failed");
            err
        })?;

        if let Err(err) = self.session.init(true) {
            error!(gpu = gpu.instance(), %err, "cannot load firmware resource manager");
            return Err(RmError::Generic);
        }

        if gpu.property(GpuProperty::InPmResumeCodepath) {
            self.replay(gpu)?;
        }
        Ok(())
    }

    pub fn on_state_unload(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        debug!(gpu = gpu.instance(), %flags, "client registry state unload");
        if !flags.is_pm_transition() {
            return Ok(());
        }

        let status = self.session.init(false);
        if let Err(err) = &status {
            error!(gpu = gpu.instance(), %err, "cannot unload firmware resource manager");
        }
        self.transport.deinit();
        status
    }

    pub fn on_destroy(&self, gpu: &Gpu) {
        self.transport.deinit();
        let mut tables = self.tables.lock();
        for array in tables.all_mut() {
            array.invalidate_all();
        }
        info!(gpu = gpu.instance(), "client registry destroyed; all slots invalidated");
    }

    fn replay(&self, gpu: &Gpu) -> RmResult<()> {
        // Copy the plan out so the allocator runs without the table lock held.
        let order = self.tables.lock().replay_order();
        let mut sequence = ShortCircuit::new();
        for (kind, index, object) in &order {
            let label = format!("{kind}[{index}]");
            sequence.step(&label, || {
                self.allocator.alloc(&object.alloc_request()).map_err(|err| {
                    error!(
                        gpu = gpu.instance(),
                        %kind,
                        index,
                        object = %object.object,
                        %err,
                        "cannot alloc client object during resume"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_replay_failure(kind.as_str());
                    }
                    RmError::Generic
                })
            })?;
            if let Some(metrics) = &self.metrics {
                metrics.record_replayed(kind.as_str());
            }
        }
        info!(gpu = gpu.instance(), replayed = sequence.completed(), "client objects replayed");
        Ok(())
    }

    fn slot_mut(tables: &mut SlotTables, kind: SlotKind, index: usize) -> RmResult<&mut ClientSlot> {
        tables.array_mut(kind).get_mut(index).ok_or_else(|| {
            warn!(%kind, index, "slot index out of range");
            RmError::InvalidArgument
        })
    }
}

impl StateEngine for ClientObjectRegistry {
    fn name(&self) -> &'static str {
        "client_registry"
    }

    fn construct(&self, gpu: &Gpu) -> RmResult<()> {
        self.on_construct(gpu)
    }

    fn state_load(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        self.on_state_load(gpu, flags)
    }

    fn state_unload(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        self.on_state_unload(gpu, flags)
    }

    fn destroy(&self, gpu: &Gpu) {
        self.on_destroy(gpu)
    }
}

impl std::fmt::Debug for ClientObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientObjectRegistry")
            .field("max_clients", &self.max_clients)
            .field("valid", &self.valid_count())
            .finish()
    }
}
