//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use anyhow::Result;
use gpm_metrics::SharedRegistry;
use prometheus::{IntCounter, IntCounterVec, Opts};

/// Metrics published by the power-transition core.
#[derive(Clone)]
pub struct PowerMetrics {
    registry: SharedRegistry,
    transitions_total: IntCounterVec,
    recovery_attempts_total: IntCounterVec,
    replayed_objects_total: IntCounterVec,
    replay_failures_total: IntCounterVec,
    flush_assertions_total: IntCounter,
}

impl std::fmt::Debug for PowerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerMetrics")
            .field("flush_assertions", &self.flush_assertions_total.get())
            .finish_non_exhaustive()
    }
}

impl PowerMetrics {
    /// Register the power-management metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let transitions_total = IntCounterVec::new(
            Opts::new(
                "gpm_power_transitions_total",
                "Power transitions requested, by action and final status",
            ),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let recovery_attempts_total = IntCounterVec::new(
            Opts::new(
                "gpm_power_recovery_attempts_total",
                "Compensating resumes run after a failed suspend-direction transition",
            ),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(recovery_attempts_total.clone()))?;

        let replayed_objects_total = IntCounterVec::new(
            Opts::new(
                "gpm_registry_replayed_objects_total",
                "Client objects re-created on the firmware side after resume",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(replayed_objects_total.clone()))?;

        let replay_failures_total = IntCounterVec::new(
            Opts::new(
                "gpm_registry_replay_failures_total",
                "Replay aborts, by the kind of object whose allocation failed",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(replay_failures_total.clone()))?;

        let flush_assertions_total = IntCounter::with_opts(Opts::new(
            "gpm_work_queue_flush_assertions_total",
            "Work-queue flushes that failed around a power transition",
        ))?;
        registry.register(Box::new(flush_assertions_total.clone()))?;

        Ok(Self {
            registry,
            transitions_total,
            recovery_attempts_total,
            replayed_objects_total,
            replay_failures_total,
            flush_assertions_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_transition(&self, action: &str, outcome: &str) {
        self.transitions_total
            .with_label_values(&[action, outcome])
            .inc();
    }

    pub fn record_recovery(&self, action: &str, outcome: &str) {
        self.recovery_attempts_total
            .with_label_values(&[action, outcome])
            .inc();
    }

    pub fn record_replayed(&self, kind: &str) {
        self.replayed_objects_total.with_label_values(&[kind]).inc();
    }

    pub fn record_replay_failure(&self, kind: &str) {
        self.replay_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn inc_flush_assertion(&self) {
        self.flush_assertions_total.inc();
    }
}
