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

use tracing::{debug, info};

use crate::device::Gpu;
use crate::flags::StateFlags;
use crate::sequence::{BestEffortSweep, ShortCircuit};
use crate::status::RmResult;

/// Device-state load/unload as seen by the power-transition controller.
pub trait GpuStateEngine: Send + Sync {
    fn state_load(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()>;
    fn state_unload(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()>;
}

/// Lifecycle hooks of one engine owned by the GPU object.
pub trait StateEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn construct(&self, _gpu: &Gpu) -> RmResult<()> {
        Ok(())
    }

    fn state_load(&self, _gpu: &Gpu, _flags: StateFlags) -> RmResult<()> {
        Ok(())
    }

    fn state_unload(&self, _gpu: &Gpu, _flags: StateFlags) -> RmResult<()> {
        Ok(())
    }

    fn destroy(&self, _gpu: &Gpu) {}
}

/// Ordered engine table.
///
/// Load walks the table front to back and stops at the first failure. Unload walks it back
/// to front, keeps going past failures and reports the first one at the end.
#[derive(Default)]
pub struct EngineList {
    engines: Vec<Arc<dyn StateEngine>>,
}

impl EngineList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: Arc<dyn StateEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|engine| engine.name()).collect()
    }

    pub fn construct_all(&self, gpu: &Gpu) -> RmResult<()> {
        let mut sequence = ShortCircuit::new();
        for engine in &self.engines {
            sequence.step(engine.name(), || engine.construct(gpu))?;
        }
        info!(gpu = gpu.instance(), engines = sequence.completed(), "engines constructed");
        Ok(())
    }

    pub fn destroy_all(&self, gpu: &Gpu) {
        for engine in self.engines.iter().rev() {
            debug!(gpu = gpu.instance(), engine = engine.name(), "destroying engine");
            engine.destroy(gpu);
        }
    }
}

impl GpuStateEngine for EngineList {
    fn state_load(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        let mut sequence = ShortCircuit::new();
        for engine in &self.engines {
            sequence.step(engine.name(), || engine.state_load(gpu, flags))?;
        }
        debug!(gpu = gpu.instance(), %flags, loaded = sequence.completed(), "engines loaded");
        Ok(())
    }

    fn state_unload(&self, gpu: &Gpu, flags: StateFlags) -> RmResult<()> {
        let mut sweep = BestEffortSweep::new();
        for engine in self.engines.iter().rev() {
            sweep.step(engine.name(), || engine.state_unload(gpu, flags));
        }
        debug!(
            gpu = gpu.instance(),
            %flags,
            attempted = sweep.attempted(),
            failed = sweep.failed(),
            "engines unloaded"
        );
        sweep.finish()
    }
}

impl std::fmt::Debug for EngineList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
