//! ---
//! gpm_section: "03-observability"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Metrics collection and export utilities."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{debug, info};

/// Shared registry type used across components.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every family in `registry` in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .context("failed to encode metrics")?;
    debug!(families = families.len(), bytes = buffer.len(), "metrics encoded");
    String::from_utf8(buffer).context("metrics exposition is not valid utf-8")
}

/// Write the text exposition to `path`, for node-exporter style textfile collection.
pub fn write_textfile(registry: &Registry, path: &Path) -> Result<()> {
    let body = encode_text(registry)?;
    fs::write(path, body)
        .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    info!(path = %path.display(), "metrics textfile written");
    Ok(())
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{IntCounter, Opts};

    #[test]
    fn text_exposition_contains_registered_counter() {
        let registry = new_registry();
        let counter = IntCounter::with_opts(Opts::new("gpm_test_total", "test counter")).unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc_by(3);

        let body = encode_text(&registry).unwrap();
        assert!(body.contains("# TYPE gpm_test_total counter"));
        assert!(body.contains("gpm_test_total 3"));
    }

    #[test]
    fn empty_registry_encodes_to_empty_text() {
        assert_eq!(encode_text(&new_registry()).unwrap(), "");
    }

    #[test]
    fn textfile_is_written_next_to_other_collectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpm.prom");
        let registry = new_registry();
        let counter = IntCounter::with_opts(Opts::new("gpm_file_total", "file counter")).unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc();

        write_textfile(&registry, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("gpm_file_total 1"));
    }
}
