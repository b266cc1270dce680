//! ---
//! gpm_section: "11-simulation-test-harness"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Simulated platform for exercising power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use gpm_common::{AppConfig, FaultPoint, ObjectConfig, ObjectKind};
use gpm_core::{
    ClassId, ClientObjectRegistry, DeviceHandle, EngineList, Gpu, GpuProperty, Handle, PmAction,
    PowerMetrics, PowerTransitionController, RemoteAllocator, RemoteObject, RmResult, SlotKind,
    TransitionReport,
};
use gpm_logging::{pm_info, PmLogContext};
use gpm_metrics::SharedRegistry;
use tracing::debug;

use crate::collaborators::{FaultyEngine, JournalingQueue, RecordingLock, SimFirmware};
use crate::error::SimError;
use crate::faults::FaultPlan;
use crate::journal::Journal;

/// Name of the stand-in engine that shares the engine list with the registry.
pub const SIM_ENGINE: &str = "sim_engine";

fn slot_kind(kind: ObjectKind) -> SlotKind {
    match kind {
        ObjectKind::Root => SlotKind::Root,
        ObjectKind::Device => SlotKind::Device,
        ObjectKind::Subdevice => SlotKind::Subdevice,
        ObjectKind::Display => SlotKind::Display,
        ObjectKind::DisplaySoftware => SlotKind::DisplaySoftware,
    }
}

fn remote_object(object: &ObjectConfig) -> Result<RemoteObject, SimError> {
    Ok(RemoteObject {
        client: Handle(object.client),
        parent: Handle(object.parent),
        object: Handle(object.object),
        class: ClassId(object.class),
        params: Bytes::from(object.params_bytes()?),
    })
}

/// Builder for [`SimulatedPlatform`].
#[derive(Default)]
pub struct SimulatedPlatformBuilder {
    config: AppConfig,
    faults: Option<FaultPlan>,
    metrics: Option<SharedRegistry>,
}

impl std::fmt::Debug for SimulatedPlatformBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlatformBuilder")
            .field("device", &self.config.power.device)
            .field("faults", &self.faults.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl SimulatedPlatformBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `faults` instead of the plan described by the configuration.
    pub fn faults(mut self, faults: FaultPlan) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn metrics(mut self, registry: SharedRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    pub fn build(self) -> Result<SimulatedPlatform, SimError> {
        let config = self.config;
        let journal = Journal::new();
        let faults = match self.faults {
            Some(faults) => faults,
            None => FaultPlan::from_config(&config.scenario.faults)?,
        };
        let metrics = self.metrics.map(PowerMetrics::new).transpose()?;

        let firmware = Arc::new(SimFirmware::new(journal.clone(), faults.clone()));
        let mut registry = ClientObjectRegistry::new(
            config.registry.max_clients,
            firmware.clone(),
            firmware.clone(),
            firmware.clone(),
        );
        if let Some(metrics) = &metrics {
            registry = registry.with_metrics(metrics.clone());
        }
        let registry = Arc::new(registry);

        let engines = Arc::new(
            EngineList::new()
                .with_engine(registry.clone())
                .with_engine(Arc::new(FaultyEngine::new(
                    SIM_ENGINE,
                    journal.clone(),
                    faults.clone(),
                ))),
        );
        let gpu = Arc::new(Gpu::new(config.power.gpu_instance, engines.clone()));
        gpu.properties()
            .set(GpuProperty::Gc6StateEntering, config.power.gc6_entering);
        engines.construct_all(&gpu).map_err(SimError::Construct)?;

        for object in &config.scenario.objects {
            let kind = slot_kind(object.kind);
            registry
                .record(kind, object.index, remote_object(object)?)
                .map_err(|source| SimError::Seed {
                    kind,
                    index: object.index,
                    source,
                })?;
        }

        let queue = Arc::new(JournalingQueue::new(
            &config.power.device,
            journal.clone(),
            faults.clone(),
        ));
        let device_lock = Arc::new(RecordingLock::new(
            &format!("{}.device", config.power.device),
            FaultPoint::DeviceLock,
            journal.clone(),
            faults.clone(),
        ));
        let device = DeviceHandle::new(&config.power.device, device_lock.clone(), queue.clone());
        if config.power.bind_gpu {
            device.bind_gpu(gpu.clone());
        }

        let api_lock = Arc::new(RecordingLock::new(
            "api",
            FaultPoint::ApiLock,
            journal.clone(),
            faults.clone(),
        ));
        let mut controller = PowerTransitionController::new(api_lock.clone());
        if let Some(metrics) = &metrics {
            controller = controller.with_metrics(metrics.clone());
        }

        debug!(
            device = %config.power.device,
            engines = ?engines.names(),
            seeded = registry.valid_count(),
            "simulated platform assembled"
        );

        Ok(SimulatedPlatform {
            config,
            journal,
            faults,
            firmware,
            registry,
            engines,
            gpu,
            queue,
            device,
            device_lock,
            api_lock,
            controller,
            metrics,
        })
    }
}

/// A device with a bound GPU whose collaborators are all simulated.
#[derive(Debug)]
pub struct SimulatedPlatform {
    config: AppConfig,
    journal: Journal,
    faults: FaultPlan,
    firmware: Arc<SimFirmware>,
    registry: Arc<ClientObjectRegistry>,
    engines: Arc<EngineList>,
    gpu: Arc<Gpu>,
    queue: Arc<JournalingQueue>,
    device: DeviceHandle,
    device_lock: Arc<RecordingLock>,
    api_lock: Arc<RecordingLock>,
    controller: PowerTransitionController,
    metrics: Option<PowerMetrics>,
}

impl SimulatedPlatform {
    pub fn builder() -> SimulatedPlatformBuilder {
        SimulatedPlatformBuilder::default()
    }

    pub fn from_config(config: AppConfig) -> Result<Self, SimError> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn firmware(&self) -> &SimFirmware {
        &self.firmware
    }

    pub fn registry(&self) -> &ClientObjectRegistry {
        &self.registry
    }

    pub fn engines(&self) -> &EngineList {
        &self.engines
    }

    pub fn gpu(&self) -> &Arc<Gpu> {
        &self.gpu
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn queue(&self) -> &JournalingQueue {
        &self.queue
    }

    pub fn controller(&self) -> &PowerTransitionController {
        &self.controller
    }

    pub fn metrics_registry(&self) -> Option<SharedRegistry> {
        self.metrics.as_ref().map(PowerMetrics::registry)
    }

    /// `true` while either lock is held. Always `false` between transitions.
    pub fn locks_held(&self) -> bool {
        self.api_lock.is_held() || self.device_lock.is_held()
    }

    /// Allocate an object on the firmware and record it, as the RPC allocation path does.
    pub fn allocate(&self, kind: SlotKind, index: usize, object: RemoteObject) -> RmResult<()> {
        self.firmware.alloc(&object.alloc_request())?;
        self.registry.record(kind, index, object)
    }

    pub fn transition(&self, action: PmAction) -> TransitionReport {
        let report = self
            .controller
            .request_transition_with_report(&self.device, action);
        let action_name = action.to_string();
        let ctx = PmLogContext::new()
            .with_device(self.device.name())
            .with_action(&action_name)
            .with_gpu(self.gpu.instance());
        match &report.error {
            None => pm_info!(context = ctx, "simulated transition ok"),
            Some(err) => pm_info!(context = ctx, "simulated transition returned {}", err),
        }
        report
    }

    /// Run `actions` in order, pausing between them as configured.
    pub fn run(&self, actions: &[PmAction]) -> Vec<TransitionReport> {
        let pause = self.config.scenario.pause_between_actions;
        let mut reports = Vec::with_capacity(actions.len());
        for (step, action) in actions.iter().enumerate() {
            if step > 0 && !pause.is_zero() {
                thread::sleep(pause);
            }
            reports.push(self.transition(*action));
        }
        reports
    }

    pub fn scenario_actions(&self) -> Result<Vec<PmAction>, SimError> {
        self.config
            .scenario
            .actions
            .iter()
            .map(|raw| raw.parse::<PmAction>().map_err(|_| SimError::Action(raw.clone())))
            .collect()
    }

    pub fn run_scenario(&self) -> Result<Vec<TransitionReport>, SimError> {
        let actions = self.scenario_actions()?;
        Ok(self.run(&actions))
    }

    /// Tear the engines down and detach the GPU from the device.
    pub fn shutdown(&self) {
        self.engines.destroy_all(&self.gpu);
        self.device.unbind_gpu();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpm_core::RmError;

    #[test]
    fn engines_are_ordered_registry_first() {
        let platform = SimulatedPlatform::from_config(AppConfig::default()).unwrap();
        assert_eq!(platform.engines().names(), vec!["client_registry", SIM_ENGINE]);
        assert!(platform.firmware().transport_up());
    }

    #[test]
    fn scenario_actions_reject_unknown_names() {
        let mut config = AppConfig::default();
        config.scenario.actions = vec!["standby".into(), "nap".into()];
        let platform = SimulatedPlatform::from_config(config).unwrap();
        assert!(matches!(
            platform.scenario_actions(),
            Err(SimError::Action(name)) if name == "nap"
        ));
    }

    #[test]
    fn allocate_goes_through_firmware() {
        let platform = SimulatedPlatform::from_config(AppConfig::default()).unwrap();
        let object = RemoteObject {
            client: Handle(1),
            parent: Handle(1),
            object: Handle(1),
            class: ClassId(0x41),
            params: Bytes::new(),
        };
        platform.allocate(SlotKind::Root, 0, object.clone()).unwrap();
        assert_eq!(platform.firmware().live_objects(), vec![Handle(1)]);
        assert_eq!(
            platform.allocate(SlotKind::Root, 0, object),
            Err(RmError::InvalidState)
        );
    }
}
