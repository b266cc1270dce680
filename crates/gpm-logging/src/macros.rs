//! ---
//! gpm_section: "03-observability"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Structured logging adapters and sinks."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---

/// Emit an informational log enriched with device context.
#[macro_export]
macro_rules! pm_info {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::INFO,
            device = ctx.device.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            gpu = ctx.gpu.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::pm_info!(context = $crate::PmLogContext::default(), $($arg)+)
    }};
}

/// Emit a debug log enriched with device context.
#[macro_export]
macro_rules! pm_debug {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::DEBUG,
            device = ctx.device.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            gpu = ctx.gpu.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::pm_debug!(context = $crate::PmLogContext::default(), $($arg)+)
    }};
}

/// Emit a warning log enriched with device context.
#[macro_export]
macro_rules! pm_warn {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::WARN,
            device = ctx.device.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            gpu = ctx.gpu.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::pm_warn!(context = $crate::PmLogContext::default(), $($arg)+)
    }};
}

/// Emit an error log enriched with device context.
#[macro_export]
macro_rules! pm_error {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::ERROR,
            device = ctx.device.unwrap_or(""),
            action = ctx.action.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            gpu = ctx.gpu.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::pm_error!(context = $crate::PmLogContext::default(), $($arg)+)
    }};
}
