//! Configuration reload coordination
//!
//! A reload replaces the registry and the configuration snapshot while
//! producers keep submitting. The requester and the consumer thread meet
//! through a small state machine kept under the queue mutex:
//!
//! ```text
//! Idle --request_reload--> ReloadRequested --consumer--> Reloading --applied--> Idle
//! ```
//!
//! The consumer only picks a request up between batches, and flushes every
//! queued event under the old registry before it builds the new one. The
//! new registry is built without holding the lock; only the final swap is
//! done under it. Each request gets a ticket, and the requester waits until
//! the completed generation reaches its ticket.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::config::{AuditConfig, ConfigError};
use super::queue::EventQueue;
use super::registry::{ModuleDescriptor, SchemaError};
use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadState {
    #[default]
    Idle,
    ReloadRequested,
    Reloading,
}

/// A reload handed from the requester to the consumer
#[derive(Debug)]
pub struct ReloadRequest {
    pub(crate) ticket: u64,
    pub(crate) config: AuditConfig,
    pub(crate) descriptor: ModuleDescriptor,
}

/// Why a reload was not applied
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("new configuration rejected: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("new descriptor rejected, previous registry kept: {0}")]
    Schema(#[from] SchemaError),

    #[error("audit pipeline is shutting down")]
    ShuttingDown,
}

impl ReloadError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(e) => e.code(),
            Self::Schema(e) => e.code(),
            Self::ShuttingDown => ErrorCode::ReloadAborted,
        }
    }
}

/// Reload state machine plus the outcomes not yet collected by requesters
#[derive(Debug, Default)]
pub(crate) struct ReloadCoordinator {
    state: ReloadState,
    /// Ticket of the most recently completed request
    generation: u64,
    pending: Option<ReloadRequest>,
    outcomes: BTreeMap<u64, Result<(), ReloadError>>,
}

impl ReloadCoordinator {
    pub(crate) fn state(&self) -> ReloadState {
        self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Idle -> ReloadRequested; returns the request's ticket
    fn issue(&mut self, config: AuditConfig, descriptor: ModuleDescriptor) -> u64 {
        let ticket = self.generation + 1;
        self.pending = Some(ReloadRequest {
            ticket,
            config,
            descriptor,
        });
        self.state = ReloadState::ReloadRequested;
        ticket
    }

    /// ReloadRequested -> Reloading, handing the request to the consumer
    pub(crate) fn begin(&mut self) -> Option<ReloadRequest> {
        if self.state != ReloadState::ReloadRequested {
            return None;
        }
        let request = self.pending.take()?;
        self.state = ReloadState::Reloading;
        Some(request)
    }

    /// Reloading -> Idle, recording the outcome for the requester
    fn finish(&mut self, ticket: u64, outcome: Result<(), ReloadError>) {
        self.generation = ticket;
        self.state = ReloadState::Idle;
        self.outcomes.insert(ticket, outcome);
    }

    /// Fail a request the consumer never picked up
    pub(crate) fn abort_pending(&mut self) {
        if let Some(request) = self.pending.take() {
            self.finish(request.ticket, Err(ReloadError::ShuttingDown));
        }
    }

    fn completed(&self, ticket: u64) -> bool {
        self.generation >= ticket
    }

    fn take_outcome(&mut self, ticket: u64) -> Option<Result<(), ReloadError>> {
        self.outcomes.remove(&ticket)
    }
}

/// Configuration swap performed by a successful reload
#[derive(Debug, Clone)]
pub(crate) struct AppliedReload {
    pub(crate) previous: Arc<AuditConfig>,
    pub(crate) current: Arc<AuditConfig>,
}

impl EventQueue {
    /// Replace the registry and configuration, blocking until applied
    ///
    /// A request made while another reload is in flight waits for it to
    /// finish first. On any error the previous registry and configuration
    /// stay installed.
    pub fn request_reload(
        &self,
        config: AuditConfig,
        descriptor: ModuleDescriptor,
    ) -> Result<(), ReloadError> {
        if let Err(e) = config.validate() {
            self.log.report(e.code(), Some(&e.to_string()));
            return Err(e.into());
        }

        let mut state = self.lock();
        loop {
            if state.terminate || state.consumer_stopped {
                return Err(ReloadError::ShuttingDown);
            }
            if state.reload.state() == ReloadState::Idle {
                break;
            }
            state = self.wait_reload_finished(state);
        }

        let ticket = state.reload.issue(config, descriptor);
        tracing::debug!(ticket, "Reload requested");
        self.events_arrived.notify_all();

        while !state.reload.completed(ticket) {
            if state.consumer_stopped {
                return Err(ReloadError::ShuttingDown);
            }
            state = self.wait_reload_finished(state);
        }

        state.reload.take_outcome(ticket).unwrap_or(Ok(()))
    }

    /// Where the reload state machine currently is
    pub fn reload_state(&self) -> ReloadState {
        self.lock().reload.state()
    }

    /// Number of reload requests completed so far, successful or not
    pub fn reload_generation(&self) -> u64 {
        self.lock().reload.generation()
    }

    /// Consumer side: build the new registry and swap it in
    ///
    /// Must be called with no events left from before the request; the
    /// consumer flushes them first.
    pub(crate) fn apply_reload(&self, request: ReloadRequest) -> Option<AppliedReload> {
        let ReloadRequest {
            ticket,
            config,
            descriptor,
        } = request;

        match descriptor.build(&config) {
            Ok(registry) => {
                let current = Arc::new(config);
                let mut state = self.lock();
                state.registry = Arc::new(registry);
                let previous = std::mem::replace(&mut state.config, Arc::clone(&current));
                state.reload.finish(ticket, Ok(()));
                self.reload_finished.notify_all();
                drop(state);

                self.stats.record_reload();
                tracing::info!(ticket, "Audit configuration reloaded");
                Some(AppliedReload { previous, current })
            }
            Err(e) => {
                self.log.report(e.code(), Some(&e.to_string()));
                let mut state = self.lock();
                state.reload.finish(ticket, Err(e.into()));
                self.reload_finished.notify_all();
                None
            }
        }
    }
}
