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

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Observable call made into a simulated collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    Flush { queue: String, ok: bool },
    LockAcquired { lock: String },
    LockRefused { lock: String },
    LockReleased { lock: String },
    EngineLoad { engine: String, flags: String },
    EngineUnload { engine: String, flags: String },
    TransportInit { ok: bool },
    TransportDeinit,
    SessionInit { load: bool, ok: bool },
    Alloc { object: u32, class: u32, ok: bool },
}

impl SimEvent {
    pub fn is_alloc(&self) -> bool {
        matches!(self, SimEvent::Alloc { .. })
    }

    pub fn is_lock_event(&self) -> bool {
        matches!(
            self,
            SimEvent::LockAcquired { .. } | SimEvent::LockRefused { .. } | SimEvent::LockReleased { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SimEvent,
}

/// Append-only, shareable call log.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: SimEvent) {
        let mut entries = self.entries.lock();
        let seq = entries.len() as u64;
        entries.push(JournalEntry {
            seq,
            at: Utc::now(),
            event,
        });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.entries.lock().iter().map(|entry| entry.event.clone()).collect()
    }

    pub fn count(&self, predicate: impl Fn(&SimEvent) -> bool) -> usize {
        self.entries.lock().iter().filter(|entry| predicate(&entry.event)).count()
    }

    /// Object handles passed to successful and failed allocations, in call order.
    pub fn allocations(&self) -> Vec<u32> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry.event {
                SimEvent::Alloc { object, .. } => Some(object),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
