//! ---
//! gpm_section: "11-simulation-test-harness"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Simulated platform for exercising power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::collections::BTreeSet;

use gpm_common::FaultPoint;
use gpm_core::{
    AllocRequest, BlockingLock, DeferredWorkQueue, ExclusiveLock, FirmwareSession, Gpu, Handle,
    LockModule, RemoteAllocator, RmResult, RpcTransport, StateEngine, StateFlags, WorkQueue,
};
use gpm_logging::{pm_debug, pm_warn, PmLogContext};
use parking_lot::Mutex;

use crate::faults::FaultPlan;
use crate::journal::{Journal, SimEvent};

#[derive(Debug, Default)]
struct FirmwareState {
    transport_up: bool,
    session_loaded: bool,
    live: BTreeSet<Handle>,
}

/// Firmware side of the RPC link: transport, RM session and object allocation.
#[derive(Debug)]
pub struct SimFirmware {
    journal: Journal,
    faults: FaultPlan,
    state: Mutex<FirmwareState>,
}

impl SimFirmware {
    pub fn new(journal: Journal, faults: FaultPlan) -> Self {
        Self {
            journal,
            faults,
            state: Mutex::new(FirmwareState::default()),
        }
    }

    pub fn transport_up(&self) -> bool {
        self.state.lock().transport_up
    }

    pub fn session_loaded(&self) -> bool {
        self.state.lock().session_loaded
    }

    /// Objects the firmware currently knows about. Emptied when the session unloads.
    pub fn live_objects(&self) -> Vec<Handle> {
        self.state.lock().live.iter().copied().collect()
    }
}

impl RpcTransport for SimFirmware {
    fn init(&self) -> RmResult<()> {
        let status = self.faults.check(FaultPoint::TransportInit);
        self.journal.record(SimEvent::TransportInit { ok: status.is_ok() });
        status?;
        self.state.lock().transport_up = true;
        Ok(())
    }

    fn deinit(&self) {
        self.journal.record(SimEvent::TransportDeinit);
        self.state.lock().transport_up = false;
    }
}

impl FirmwareSession for SimFirmware {
    fn init(&self, load: bool) -> RmResult<()> {
        let point = if load {
            FaultPoint::SessionLoad
        } else {
            FaultPoint::SessionUnload
        };
        let status = self.faults.check(point);
        self.journal.record(SimEvent::SessionInit {
            load,
            ok: status.is_ok(),
        });
        status?;
        let mut state = self.state.lock();
        state.session_loaded = load;
        if !load {
            state.live.clear();
        }
        Ok(())
    }
}

impl RemoteAllocator for SimFirmware {
    fn alloc(&self, request: &AllocRequest<'_>) -> RmResult<()> {
        let status = self.faults.check_alloc(request.object);
        self.journal.record(SimEvent::Alloc {
            object: request.object.0,
            class: request.class.0,
            ok: status.is_ok(),
        });
        status?;
        self.state.lock().live.insert(request.object);
        Ok(())
    }
}

/// [`BlockingLock`] that journals every acquire and release and can be made to refuse.
#[derive(Debug)]
pub struct RecordingLock {
    inner: BlockingLock,
    fault: FaultPoint,
    journal: Journal,
    faults: FaultPlan,
}

impl RecordingLock {
    pub fn new(name: &str, fault: FaultPoint, journal: Journal, faults: FaultPlan) -> Self {
        Self {
            inner: BlockingLock::new(name),
            fault,
            journal,
            faults,
        }
    }

    pub fn is_held(&self) -> bool {
        self.inner.is_held()
    }
}

impl ExclusiveLock for RecordingLock {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn acquire(&self, module: LockModule) -> RmResult<()> {
        let lock = self.name().to_owned();
        if let Err(err) = self.faults.check(self.fault) {
            self.journal.record(SimEvent::LockRefused { lock });
            return Err(err);
        }
        self.inner.acquire(module)?;
        self.journal.record(SimEvent::LockAcquired { lock });
        Ok(())
    }

    fn release(&self) {
        self.journal.record(SimEvent::LockReleased {
            lock: self.name().to_owned(),
        });
        self.inner.release();
    }
}

/// Device work queue that journals flushes.
#[derive(Debug)]
pub struct JournalingQueue {
    name: String,
    inner: DeferredWorkQueue,
    journal: Journal,
    faults: FaultPlan,
}

impl JournalingQueue {
    pub fn new(name: &str, journal: Journal, faults: FaultPlan) -> Self {
        Self {
            name: name.to_owned(),
            inner: DeferredWorkQueue::new(name),
            journal,
            faults,
        }
    }

    pub fn enqueue<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.enqueue(work);
    }

    pub fn pending(&self) -> usize {
        self.inner.pending()
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl WorkQueue for JournalingQueue {
    fn flush(&self) -> RmResult<()> {
        let status = self
            .faults
            .check(FaultPoint::Flush)
            .and_then(|()| self.inner.flush());
        self.journal.record(SimEvent::Flush {
            queue: self.name.clone(),
            ok: status.is_ok(),
        });
        status
    }
}

/// Stand-in for the other device engines sharing the engine list with the registry.
#[derive(Debug)]
pub struct FaultyEngine {
    name: &'static str,
    journal: Journal,
    faults: FaultPlan,
}

impl FaultyEngine {
    pub fn new(name: &'static str, journal: Journal, faults: FaultPlan) -> Self {
        Self {
            name,
            journal,
            faults,
        }
    }
}

impl StateEngine for FaultyEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn state_load(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        self.journal.record(SimEvent::EngineLoad {
            engine: self.name.to_owned(),
            flags: flags.to_string(),
        });
        let ctx = PmLogContext::new().with_engine(self.name).with_gpu(gpu.instance());
        self.faults.check(FaultPoint::EngineLoad).map_err(|err| {
            pm_warn!(context = ctx.clone(), "injected load failure: {}", err);
            err
        })?;
        pm_debug!(context = ctx, "engine loaded with {}", flags);
        Ok(())
    }

    fn state_unload(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        self.journal.record(SimEvent::EngineUnload {
            engine: self.name.to_owned(),
            flags: flags.to_string(),
        });
        let ctx = PmLogContext::new().with_engine(self.name).with_gpu(gpu.instance());
        self.faults.check(FaultPoint::EngineUnload).map_err(|err| {
            pm_warn!(context = ctx.clone(), "injected unload failure: {}", err);
            err
        })?;
        pm_debug!(context = ctx, "engine unloaded with {}", flags);
        Ok(())
    }
}
