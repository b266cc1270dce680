//! ---
//! gpm_section: "01-core-functionality"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Tracing bootstrap for gpmctl runs and simulator sessions."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "GPM_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static STDERR_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Console encoding for transition logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Resolve the filter: an explicit `GPM_LOG` directive, then `RUST_LOG`, then `info`.
fn resolve_filter(directive: Option<String>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring {LOG_ENV}={directive:?} ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

fn console_layer<S>(format: LogFormat, writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().with_writer(writer).boxed(),
        LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
    }
}

fn transition_log_layer<S>(
    service_name: &str,
    config: &LoggingConfig,
) -> Result<Option<BoxedLayer<S>>>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    if !config.file_enabled {
        return Ok(None);
    }
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let (writer, guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let _ = FILE_GUARD.set(guard);
    Ok(Some(
        fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(writer)
            .boxed(),
    ))
}

/// Install the global subscriber for a `gpmctl` run.
///
/// Logs go to stderr so `--json` reports and metric expositions on stdout stay parseable.
/// With `file_enabled` every transition is also kept as JSON in a daily file under
/// `config.directory`. A subscriber installed earlier wins; the call is then a no-op.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let filter = resolve_filter(std::env::var(LOG_ENV).ok());
    let file_layer = transition_log_layer(service_name, config)?;

    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = STDERR_GUARD.set(stderr_guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(config.format, stderr_writer))
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        format = ?config.format,
        transition_log = config.file_enabled,
        "tracing initialised"
    );
    Ok(())
}
