//! ---
//! gpm_section: "11-simulation-test-harness"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Simulated platform for exercising power transitions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use gpm_common::{FaultConfig, FaultPoint};
use gpm_core::{Handle, RmError, RmResult};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::SimError;

#[derive(Debug, Default)]
struct FaultTable {
    points: HashMap<FaultPoint, RmError>,
    alloc: HashMap<Handle, RmError>,
}

/// Shared, mutable set of injected failures.
///
/// Clones share state, so a test can arm a fault after the platform is built.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    table: Arc<RwLock<FaultTable>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FaultConfig) -> Result<Self, SimError> {
        let plan = Self::new();
        for (point, status) in &config.points {
            let status = parse_status(&format!("{point:?}"), status)?;
            plan.inject(*point, Some(status));
        }
        for fault in &config.alloc {
            let status = parse_status(&format!("alloc {:#010x}", fault.object), &fault.status)?;
            plan.inject_alloc(Handle(fault.object), Some(status));
        }
        Ok(plan)
    }

    /// Arm (`Some`) or clear (`None`) the failure returned at `point`.
    pub fn inject(&self, point: FaultPoint, status: Option<RmError>) {
        let mut table = self.table.write();
        match status {
            Some(status) => {
                debug!(?point, %status, "fault armed");
                table.points.insert(point, status);
            }
            None => {
                table.points.remove(&point);
            }
        }
    }

    pub fn inject_alloc(&self, object: Handle, status: Option<RmError>) {
        let mut table = self.table.write();
        match status {
            Some(status) => {
                debug!(%object, %status, "allocation fault armed");
                table.alloc.insert(object, status);
            }
            None => {
                table.alloc.remove(&object);
            }
        }
    }

    pub fn clear(&self) {
        let mut table = self.table.write();
        table.points.clear();
        table.alloc.clear();
    }

    pub fn check(&self, point: FaultPoint) -> RmResult<()> {
        match self.table.read().points.get(&point) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    pub fn check_alloc(&self, object: Handle) -> RmResult<()> {
        match self.table.read().alloc.get(&object) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    pub fn status(&self, point: FaultPoint) -> Option<RmError> {
        self.table.read().points.get(&point).cloned()
    }
}

fn parse_status(point: &str, status: &str) -> Result<RmError, SimError> {
    status.parse::<RmError>().map_err(|reason| SimError::FaultStatus {
        point: point.to_owned(),
        reason,
    })
}
