//! Per-model/script run counters (C2).
//!
//! `spec.md` §2 lists `RunStats` as a component but never spells out its
//! fields; the concrete counters below come from the original module's
//! `redis_ai_objects/stats.c` (see SPEC_FULL.md §F.1): call count, error
//! count, cumulative duration in microseconds, and samples processed.
//! Updated with relaxed atomics only — spec.md §5 "Shared resource policy"
//! requires no cross-field invariant, so there's nothing for a stronger
//! ordering to protect.

use std::sync::atomic::{AtomicU64, Ordering};

/// Mutable counters attached to a `Model` or `Script`.
#[derive(Debug, Default)]
pub struct RunStats {
    calls: AtomicU64,
    errors: AtomicU64,
    duration_us: AtomicU64,
    samples: AtomicU64,
}

/// A point-in-time snapshot of [`RunStats`], safe to hand to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStatsSnapshot {
    /// Number of times this model/script was invoked.
    pub calls: u64,
    /// Number of invocations that returned an error.
    pub errors: u64,
    /// Cumulative wall-clock time spent executing, in microseconds.
    pub duration_us: u64,
    /// Total number of samples (batch-dimension extent summed across
    /// calls) processed.
    pub samples: u64,
}

impl RunStats {
    /// A fresh, zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful or failed invocation.
    pub fn record(&self, duration_us: u64, samples: u64, failed: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.duration_us.fetch_add(duration_us, Ordering::Relaxed);
        self.samples.fetch_add(samples, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read the current counters.
    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duration_us: self.duration_us.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_successes_and_failures_separately() {
        let stats = RunStats::new();
        stats.record(100, 4, false);
        stats.record(50, 1, true);
        let snap = stats.snapshot();
        assert_eq!(snap.calls, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.duration_us, 150);
        assert_eq!(snap.samples, 5);
    }

    #[test]
    fn fresh_stats_are_zero() {
        assert_eq!(RunStats::new().snapshot(), RunStatsSnapshot::default());
    }
}
