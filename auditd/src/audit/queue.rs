//! Double-buffered producer/consumer queue
//!
//! Producers append to the *fill* queue; the consumer thread owns whatever
//! sits in the *process* queue. When the process queue is empty the two
//! swap roles under the lock, and the consumer takes the whole process queue
//! as one batch so events are formatted and written without holding the lock.
//!
//! The same mutex guards the registry reference, the configuration snapshot
//! and the reload state, so an `enabled` check never observes a half-applied
//! reload.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::config::AuditConfig;
use super::envelope::{lifecycle_payload, LifecycleEvent};
use super::event::Event;
use super::registry::EventRegistry;
use super::reload::{ReloadCoordinator, ReloadRequest};
use super::stats::PipelineStats;
use crate::error::ErrorCode;
use crate::observability::LogContext;

/// Everything the producers, the consumer and reload requesters share
#[derive(Debug)]
pub(crate) struct PipelineState {
    pub(crate) fill: VecDeque<Event>,
    pub(crate) process: VecDeque<Event>,
    pub(crate) registry: Arc<EventRegistry>,
    pub(crate) config: Arc<AuditConfig>,
    pub(crate) reload: ReloadCoordinator,
    /// Shutdown requested; checked by the consumer between batches
    pub(crate) terminate: bool,
    /// Consumer thread has exited; nothing will drain the queues again
    pub(crate) consumer_stopped: bool,
}

impl PipelineState {
    fn take_all(&mut self) -> VecDeque<Event> {
        let mut events = mem::take(&mut self.process);
        events.append(&mut self.fill);
        events
    }
}

/// What the consumer should do next
#[derive(Debug)]
pub(crate) enum Step {
    /// Process these events with this registry
    Batch {
        events: VecDeque<Event>,
        registry: Arc<EventRegistry>,
    },
    /// Flush these events with the old registry, then apply the reload
    Reload {
        events: VecDeque<Event>,
        registry: Arc<EventRegistry>,
        request: ReloadRequest,
    },
    /// Final best-effort flush before exiting
    Terminate {
        events: VecDeque<Event>,
        registry: Arc<EventRegistry>,
    },
    /// Wait timed out with nothing to do
    Idle,
}

/// Queue pair plus the state shared with reload requesters
#[derive(Debug)]
pub struct EventQueue {
    pub(crate) state: Mutex<PipelineState>,
    pub(crate) events_arrived: Condvar,
    pub(crate) reload_finished: Condvar,
    pub(crate) stats: PipelineStats,
    pub(crate) log: LogContext,
}

impl EventQueue {
    pub fn new(registry: EventRegistry, config: AuditConfig, log: LogContext) -> Self {
        Self {
            state: Mutex::new(PipelineState {
                fill: VecDeque::new(),
                process: VecDeque::new(),
                registry: Arc::new(registry),
                config: Arc::new(config),
                reload: ReloadCoordinator::default(),
                terminate: false,
                consumer_stopped: false,
            }),
            events_arrived: Condvar::new(),
            reload_finished: Condvar::new(),
            stats: PipelineStats::new(),
            log,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_reload_finished<'a>(
        &self,
        guard: MutexGuard<'a, PipelineState>,
    ) -> MutexGuard<'a, PipelineState> {
        self.reload_finished
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an event if its type is known and enabled
    ///
    /// Unknown and disabled ids are accepted and discarded. Returns `false`
    /// only when the event was refused: the fill queue is at its configured
    /// ceiling or the consumer has already exited.
    pub fn submit(&self, id: u32, payload: &[u8]) -> bool {
        let mut state = self.lock();

        let enabled = match state.registry.lookup(id) {
            Some(descriptor) => descriptor.enabled,
            None => {
                drop(state);
                self.stats.record_unknown();
                tracing::debug!(event_id = id, "Dropping event with unknown id");
                return true;
            }
        };
        if !enabled {
            drop(state);
            self.stats.record_filtered();
            return true;
        }

        let full = state
            .config
            .max_queue_depth
            .is_some_and(|max| state.fill.len() >= max);
        if full || state.consumer_stopped {
            drop(state);
            self.stats.record_rejected();
            self.log
                .report(ErrorCode::DroppingEvent, Some(&format!("event id {}", id)));
            return false;
        }

        state.fill.push_back(Event::new(id, payload));
        self.events_arrived.notify_all();
        drop(state);

        self.stats.record_submitted();
        true
    }

    /// Submit a daemon lifecycle event built from the current configuration
    pub fn emit_lifecycle(&self, event: LifecycleEvent) -> bool {
        let config = self.config();
        let payload = lifecycle_payload(event, &config);
        self.submit(event.id(), payload.as_bytes())
    }

    /// Block until there is work, a reload, a shutdown or the timeout elapses
    ///
    /// `timeout` is the sink's time to its next rotation; `None` waits
    /// indefinitely.
    pub(crate) fn next_step(&self, timeout: Option<Duration>) -> Step {
        let mut state = self.lock();
        let mut timed_out = false;

        loop {
            if let Some(request) = state.reload.begin() {
                return Step::Reload {
                    events: state.take_all(),
                    registry: Arc::clone(&state.registry),
                    request,
                };
            }

            if state.terminate {
                return Step::Terminate {
                    events: state.take_all(),
                    registry: Arc::clone(&state.registry),
                };
            }

            if state.process.is_empty() {
                let PipelineState { fill, process, .. } = &mut *state;
                mem::swap(fill, process);
            }
            if !state.process.is_empty() {
                return Step::Batch {
                    events: mem::take(&mut state.process),
                    registry: Arc::clone(&state.registry),
                };
            }

            if timed_out {
                return Step::Idle;
            }

            state = match timeout {
                Some(timeout) => {
                    let (guard, result) = self
                        .events_arrived
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner);
                    timed_out = result.timed_out();
                    guard
                }
                None => self
                    .events_arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Ask the consumer to finish; waiting reload requesters are released
    pub(crate) fn shutdown(&self) {
        let mut state = self.lock();
        state.terminate = true;
        self.events_arrived.notify_all();
        self.reload_finished.notify_all();
    }

    /// Called by the consumer thread on its way out
    pub(crate) fn mark_consumer_stopped(&self) {
        let mut state = self.lock();
        state.consumer_stopped = true;
        state.reload.abort_pending();
        self.reload_finished.notify_all();
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<AuditConfig> {
        Arc::clone(&self.lock().config)
    }

    /// Current registry
    pub fn registry(&self) -> Arc<EventRegistry> {
        Arc::clone(&self.lock().registry)
    }

    /// Events waiting in either queue
    pub fn queued(&self) -> usize {
        let state = self.lock();
        state.fill.len() + state.process.len()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().terminate
    }
}
