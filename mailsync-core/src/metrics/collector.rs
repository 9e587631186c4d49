//! In-process tally of sync activity

use super::MetricsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals kept alongside the `metrics` facade, so callers without an
/// installed recorder can still read them
#[derive(Debug, Default)]
pub struct MetricsCollector {
    cycles_committed: AtomicU64,
    cycles_conflicted: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_cancelled: AtomicU64,
    changes_sent: AtomicU64,
    conflicts: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_committed(&self) {
        self.cycles_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_conflicted(&self) {
        self.cycles_conflicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.cycles_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_changes(&self, count: u64) {
        self.changes_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_conflicts(&self, count: u64) {
        self.conflicts.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a snapshot of current totals
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: std::time::SystemTime::now(),
            cycles_committed: self.cycles_committed.load(Ordering::Relaxed),
            cycles_conflicted: self.cycles_conflicted.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_cancelled: self.cycles_cancelled.load(Ordering::Relaxed),
            changes_sent: self.changes_sent.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}
