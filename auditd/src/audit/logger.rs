//! Audit logger: thin public API over the shared queue
//!
//! `AuditLogger` is what request-handling threads hold. Submission never
//! waits on the consumer: it takes the queue lock just long enough to check
//! the event type and append the event.

use std::sync::Arc;

use super::config::AuditConfig;
use super::envelope::LifecycleEvent;
use super::queue::EventQueue;
use super::registry::{EventRegistry, ModuleDescriptor};
use super::reload::ReloadError;
use super::stats::StatsSnapshot;

/// Cloneable handle for emitting audit events
///
/// Obtained from [`AuditAgent::logger`](super::AuditAgent::logger).
#[derive(Debug, Clone)]
pub struct AuditLogger {
    queue: Arc<EventQueue>,
}

impl AuditLogger {
    pub(crate) fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Submit a raw JSON payload for event type `id`
    ///
    /// Returns `true` when the event was accepted, which includes unknown and
    /// disabled ids that are silently discarded. `false` means the event was
    /// refused and has been reported as dropped.
    pub fn submit(&self, id: u32, payload: &[u8]) -> bool {
        self.queue.submit(id, payload)
    }

    /// Submit a lifecycle event with its envelope filled in
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        self.queue.emit_lifecycle(event)
    }

    /// Apply a new configuration and descriptor, blocking until the
    /// consumer has swapped them in
    pub fn reconfigure(
        &self,
        config: AuditConfig,
        descriptor: impl Into<ModuleDescriptor>,
    ) -> Result<(), ReloadError> {
        self.queue.request_reload(config, descriptor.into())
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<AuditConfig> {
        self.queue.config()
    }

    /// Current registry
    pub fn registry(&self) -> Arc<EventRegistry> {
        self.queue.registry()
    }

    /// Events accepted but not yet handed to the consumer
    pub fn queued(&self) -> usize {
        self.queue.queued()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.queue.stats().snapshot()
    }
}
