//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use gpm_logging::{log_system_event, PmLogContext, SystemEventOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::device::{DeviceHandle, Gpu, PmState};
use crate::flags::{GpuProperty, PmProperties, StateFlags};
use crate::lock::{ExclusiveLock, LockGuard, LockModule};
use crate::metrics::PowerMetrics;
use crate::status::{RmError, RmResult};

/// Requested power-state transition.
///
/// Raw action codes from the OS layer that name none of the known actions are kept as
/// `Unsupported` and rejected inside the locked section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PmAction {
    Hibernate,
    Standby,
    Resume,
    Unsupported(u32),
}

impl PmAction {
    pub const fn from_raw(code: u32) -> Self {
        match code {
            0 => PmAction::Hibernate,
            1 => PmAction::Standby,
            2 => PmAction::Resume,
            other => PmAction::Unsupported(other),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PmAction::Hibernate => "hibernate",
            PmAction::Standby => "standby",
            PmAction::Resume => "resume",
            PmAction::Unsupported(_) => "unsupported",
        }
    }

    /// Hibernate and standby both take the device down.
    pub const fn is_suspend(self) -> bool {
        matches!(self, PmAction::Hibernate | PmAction::Standby)
    }
}

impl fmt::Display for PmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PmAction::Unsupported(code) => write!(f, "unsupported({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for PmAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hibernate" => Ok(PmAction::Hibernate),
            "standby" | "suspend" => Ok(PmAction::Standby),
            "resume" => Ok(PmAction::Resume),
            other => other
                .parse::<u32>()
                .map(PmAction::from_raw)
                .map_err(|_| format!("unknown power action: {other}")),
        }
    }
}

/// One named step of a transition plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionStep {
    /// Record that a hibernate was requested.
    MarkHibernate,
    /// Unload device state for standby. Clears the hibernate marker on entry.
    Suspend,
    /// Reload device state unless a hibernate is pending.
    Resume,
    Reject,
}

/// Compensating action run after a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryStep {
    ResumeAfterFailedSuspend,
}

fn plan(action: PmAction) -> &'static [TransitionStep] {
    match action {
        // Hibernate shares the standby path, which resets the marker it just set.
        PmAction::Hibernate => &[TransitionStep::MarkHibernate, TransitionStep::Suspend],
        PmAction::Standby => &[TransitionStep::Suspend],
        PmAction::Resume => &[TransitionStep::Resume],
        PmAction::Unsupported(_) => &[TransitionStep::Reject],
    }
}

fn recovery_for(action: PmAction, status: &RmResult<()>) -> Option<RecoveryStep> {
    match (action, status) {
        (PmAction::Resume, _) | (_, Ok(())) => None,
        (_, Err(_)) => Some(RecoveryStep::ResumeAfterFailedSuspend),
    }
}

/// Outcome of the compensating resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub error: Option<RmError>,
}

/// Everything observable about one `request_transition` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionReport {
    pub device: String,
    pub action: PmAction,
    pub started_at: DateTime<Utc>,
    pub elapsed_us: u64,
    /// `false` when the device had no GPU object bound.
    pub gpu_bound: bool,
    pub error: Option<RmError>,
    pub recovery: Option<RecoveryReport>,
    pub pm_state: PmState,
    pub properties: Option<PmProperties>,
}

impl TransitionReport {
    pub fn result(&self) -> RmResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
struct LockedOutcome {
    gpu_bound: bool,
    status: RmResult<()>,
    recovery: Option<RecoveryReport>,
}

impl LockedOutcome {
    fn no_gpu() -> Self {
        Self {
            gpu_bound: false,
            status: Ok(()),
            recovery: None,
        }
    }
}

/// Drives suspend/resume requests for devices.
///
/// The API lock is process wide and always taken first; the device lock comes from the
/// device handle and is nested inside it. Both are released in reverse order on every path.
pub struct PowerTransitionController {
    api_lock: Arc<dyn ExclusiveLock>,
    metrics: Option<PowerMetrics>,
}

impl PowerTransitionController {
    pub fn new(api_lock: Arc<dyn ExclusiveLock>) -> Self {
        Self {
            api_lock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PowerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn request_transition(&self, device: &DeviceHandle, action: PmAction) -> RmResult<()> {
        self.request_transition_with_report(device, action).result()
    }

    /// Run a transition and describe what happened.
    pub fn request_transition_with_report(
        &self,
        device: &DeviceHandle,
        action: PmAction,
    ) -> TransitionReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        self.flush_work_queue(device, "before transition");
        let outcome = self.run_transition(device, action);
        self.flush_work_queue(device, "after transition");

        let report = TransitionReport {
            device: device.name().to_owned(),
            action,
            started_at,
            elapsed_us: clock.elapsed().as_micros().try_into().unwrap_or(u64::MAX),
            gpu_bound: outcome.gpu_bound,
            error: outcome.status.err(),
            recovery: outcome.recovery,
            pm_state: device.pm_state(),
            properties: device.gpu().map(|gpu| gpu.properties().pm_snapshot()),
        };
        self.publish(&report);
        report
    }

    fn run_transition(&self, device: &DeviceHandle, action: PmAction) -> LockedOutcome {
        if device.gpu().is_none() {
            debug!(device = %device.name(), %action, "no gpu bound; nothing to transition");
            return LockedOutcome::no_gpu();
        }

        let _api_guard = match LockGuard::acquire(self.api_lock.as_ref(), LockModule::DynPower) {
            Ok(guard) => guard,
            Err(err) => {
                return LockedOutcome {
                    gpu_bound: true,
                    status: Err(err),
                    recovery: None,
                }
            }
        };

        // The binding may have changed while waiting for the API lock.
        let Some(gpu) = device.gpu() else {
            debug!(device = %device.name(), %action, "gpu unbound while waiting for api lock");
            return LockedOutcome::no_gpu();
        };

        let _device_guard = match LockGuard::acquire(device.device_lock(), LockModule::DynPower) {
            Ok(guard) => guard,
            Err(err) => {
                return LockedOutcome {
                    gpu_bound: true,
                    status: Err(err),
                    recovery: None,
                }
            }
        };

        let status = self.dispatch(device, &gpu, action);
        let recovery =
            recovery_for(action, &status).map(|step| self.recover(device, &gpu, action, step));

        LockedOutcome {
            gpu_bound: true,
            status,
            recovery,
        }
        // Guards drop here: device lock first, then the API lock.
    }

    fn dispatch(&self, device: &DeviceHandle, gpu: &Gpu, action: PmAction) -> RmResult<()> {
        for step in plan(action) {
            match step {
                TransitionStep::MarkHibernate => device.set_in_hibernate(true),
                TransitionStep::Suspend => suspend(device, gpu)?,
                TransitionStep::Resume => resume(device, gpu)?,
                TransitionStep::Reject => {
                    warn!(device = %device.name(), %action, "unsupported power action");
                    return Err(RmError::InvalidArgument);
                }
            }
        }
        Ok(())
    }

    fn recover(
        &self,
        device: &DeviceHandle,
        gpu: &Gpu,
        action: PmAction,
        step: RecoveryStep,
    ) -> RecoveryReport {
        warn!(device = %device.name(), %action, ?step, "transition failed; attempting resume");
        let result = match step {
            RecoveryStep::ResumeAfterFailedSuspend => resume(device, gpu),
        };
        match &result {
            Ok(()) => info!(device = %device.name(), %action, "recovery resume succeeded"),
            Err(err) => error!(device = %device.name(), %action, %err, "recovery resume failed"),
        }
        if let Some(metrics) = &self.metrics {
            let outcome = result.as_ref().map_or_else(RmError::code, |_| "ok");
            metrics.record_recovery(action.as_str(), outcome);
        }
        RecoveryReport { error: result.err() }
    }

    fn flush_work_queue(&self, device: &DeviceHandle, stage: &'static str) {
        if let Err(err) = device.work_queue().flush() {
            error!(device = %device.name(), stage, %err, "assertion failed: work queue flush");
            if let Some(metrics) = &self.metrics {
                metrics.inc_flush_assertion();
            }
        }
    }

    fn publish(&self, report: &TransitionReport) {
        let outcome = match &report.error {
            None => "ok",
            Some(err) => err.code(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(report.action.as_str(), outcome);
        }
        let action = report.action.to_string();
        let context = PmLogContext::new()
            .with_device(&report.device)
            .with_action(&action);
        let message = match &report.error {
            None => format!("transition completed in {}us", report.elapsed_us),
            Some(err) => format!("transition failed: {err}"),
        };
        let event_outcome = if report.is_ok() {
            SystemEventOutcome::Success
        } else {
            SystemEventOutcome::Fault
        };
        log_system_event(Some(&context), "power.transition", &message, event_outcome);
    }
}

impl fmt::Debug for PowerTransitionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerTransitionController")
            .field("api_lock", &self.api_lock.name())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

fn pm_flags(gpu: &Gpu) -> StateFlags {
    StateFlags::for_pm_transition(gpu.is_gc6_entering())
}

fn suspend(device: &DeviceHandle, gpu: &Gpu) -> RmResult<()> {
    device.set_in_hibernate(false);
    let props = gpu.properties();
    props.set(GpuProperty::InPmCodepath, true);
    let status = gpu.state_unload(pm_flags(gpu));
    props.set(GpuProperty::InStandby, true);
    status
}

fn resume(device: &DeviceHandle, gpu: &Gpu) -> RmResult<()> {
    if device.pm_state().in_hibernate {
        debug!(device = %device.name(), "hibernate pending; resume skipped");
        return Ok(());
    }
    let props = gpu.properties();
    props.set(GpuProperty::InPmResumeCodepath, true);
    let status = gpu.state_load(pm_flags(gpu));
    props.set(GpuProperty::InStandby, false);
    props.set(GpuProperty::InPmCodepath, false);
    props.set(GpuProperty::InPmResumeCodepath, false);
    status
}
