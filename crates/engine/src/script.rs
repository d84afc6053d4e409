//! Script objects (C4, spec.md §3 "Script").

use crate::backend::BackendScriptHandle;
use crate::stats::{RunStats, RunStatsSnapshot};
use std::sync::Arc;
use strata_durability::ScriptRecord;

struct Inner {
    device: String,
    tag: String,
    source: String,
    entry_points: Vec<String>,
    handle: Arc<dyn BackendScriptHandle>,
    stats: RunStats,
}

/// A registered script: source text, device, tag, and the live backend
/// handle. Refcounted identically to [`crate::model::Model`].
#[derive(Clone)]
pub struct Script(Arc<Inner>);

impl Script {
    /// Construct a script around a freshly compiled backend handle.
    pub fn new(
        device: impl Into<String>,
        tag: impl Into<String>,
        source: impl Into<String>,
        entry_points: Vec<String>,
        handle: Arc<dyn BackendScriptHandle>,
    ) -> Self {
        Script(Arc::new(Inner {
            device: device.into(),
            tag: tag.into(),
            source: source.into(),
            entry_points,
            handle,
            stats: RunStats::new(),
        }))
    }

    /// The device string this script was registered for.
    pub fn device(&self) -> &str {
        &self.0.device
    }

    /// The user-supplied tag.
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// The script's source text.
    pub fn source(&self) -> &str {
        &self.0.source
    }

    /// Declared entry-point function names, if any.
    pub fn entry_points(&self) -> &[String] {
        &self.0.entry_points
    }

    /// True if `name` is a declared entry point (or no entry points were
    /// declared, meaning any function name is accepted).
    pub fn has_entry_point(&self, name: &str) -> bool {
        self.0.entry_points.is_empty() || self.0.entry_points.iter().any(|e| e == name)
    }

    /// The live backend handle.
    pub fn handle(&self) -> &Arc<dyn BackendScriptHandle> {
        &self.0.handle
    }

    /// This script's run counters.
    pub fn stats(&self) -> RunStatsSnapshot {
        self.0.stats.snapshot()
    }

    /// Record one invocation against this script's stats.
    pub fn record_run(&self, duration_us: u64, samples: u64, failed: bool) {
        self.0.stats.record(duration_us, samples, failed);
    }

    /// Two `Script` handles are the same object iff they share the
    /// backing `Arc`.
    pub fn ptr_eq(&self, other: &Script) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Map to the durability-layer persisted record (spec.md §6 "Script
    /// encoding").
    pub fn to_record(&self) -> ScriptRecord {
        ScriptRecord {
            device: self.0.device.clone(),
            tag: self.0.tag.clone(),
            source: self.0.source.clone(),
            entry_points: self.0.entry_points.clone(),
        }
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("device", &self.0.device)
            .field("tag", &self.0.tag)
            .field("entry_points", &self.0.entry_points)
            .finish()
    }
}
