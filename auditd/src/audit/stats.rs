//! Pipeline counters
//!
//! Shared between producers and the consumer thread; every counter is a
//! relaxed atomic, so a snapshot is approximate while events are in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    unknown: AtomicU64,
    filtered: AtomicU64,
    rejected: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    reloads: AtomicU64,
}

/// Cloneable handle to the pipeline counters
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    counters: Arc<Counters>,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events queued for processing
    pub submitted: u64,
    /// Submissions for ids the registry does not know
    pub unknown: u64,
    /// Submissions for disabled ids
    pub filtered: u64,
    /// Submissions refused because the queue was full
    pub rejected: u64,
    /// Lines accepted by the sink
    pub written: u64,
    /// Queued events that never reached the sink
    pub dropped: u64,
    /// Reloads applied
    pub reloads: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submitted(&self) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown(&self) {
        self.counters.unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.counters.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self) {
        self.counters.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reload(&self) {
        self.counters.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            submitted: c.submitted.load(Ordering::Relaxed),
            unknown: c.unknown.load(Ordering::Relaxed),
            filtered: c.filtered.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            written: c.written.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            reloads: c.reloads.load(Ordering::Relaxed),
        }
    }
}
