//! ---
//! gpm_section: "03-observability"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Structured logging adapters and sinks."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Thin layer over `tracing` that stamps power-management events with device context.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Same as [`init`] but writes to stderr, keeping stdout free for command output.
pub fn init_stderr() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct PmLogContext<'a> {
    /// Device the event concerns.
    pub device: Option<&'a str>,
    /// Power action in flight.
    pub action: Option<&'a str>,
    /// Engine or subsystem emitting the event.
    pub engine: Option<&'a str>,
    /// GPU instance number.
    pub gpu: Option<u32>,
}

impl<'a> PmLogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device name.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach a power action.
    pub fn with_action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    /// Attach an engine name.
    pub fn with_engine(mut self, engine: &'a str) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Attach a GPU instance.
    pub fn with_gpu(mut self, gpu: u32) -> Self {
        self.gpu = Some(gpu);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&PmLogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    // `tracing::event!` needs a constant level, so branch on the outcome.
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            gpu = ctx.gpu.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            gpu = ctx.gpu.unwrap_or_default(),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = PmLogContext::new().with_device("gpu0").with_action("standby");
        pm_info!(context = ctx.clone(), "transition started");
        pm_debug!("debug message");
        pm_warn!(context = ctx.clone().with_engine("client_registry"), "slot {} busy", 3);
        pm_error!(context = ctx, "status: {}", "timeout");
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn system_event_helper_emits() {
        init();
        let ctx = PmLogContext::new().with_device("gpu0").with_gpu(1);
        log_system_event(
            Some(&ctx),
            "power.transition",
            "transition completed",
            SystemEventOutcome::Success,
        );
        log_system_event(
            None,
            "power.transition",
            "transition failed",
            SystemEventOutcome::Fault,
        );
    }

    #[test]
    fn builder_sets_every_field() {
        let ctx = PmLogContext::new()
            .with_device("gpu0")
            .with_action("resume")
            .with_engine("client_registry")
            .with_gpu(2);
        assert_eq!(ctx.device, Some("gpu0"));
        assert_eq!(ctx.action, Some("resume"));
        assert_eq!(ctx.engine, Some("client_registry"));
        assert_eq!(ctx.gpu, Some(2));
    }
}
