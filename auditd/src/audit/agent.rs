//! Audit agent: owns the consumer thread
//!
//! The `AuditAgent` starts a single named consumer thread that drains the
//! queue, processes events sequentially in arrival order and applies
//! configuration reloads between batches. Producers never talk to the agent
//! directly; they use the cloneable [`AuditLogger`] it hands out.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::config::{AuditConfig, ConfigError};
use super::envelope::LifecycleEvent;
use super::event::Event;
use super::logger::AuditLogger;
use super::processor::EventProcessor;
use super::queue::{EventQueue, Step};
use super::registry::{EventRegistry, ModuleDescriptor};
use super::reload::ReloadRequest;
use super::storage::{AuditSink, FileSink};
use crate::error::{Error, ErrorCode, Result};
use crate::observability::{init_tracing, LogContext};

const CONSUMER_THREAD_NAME: &str = "audit-consumer";

/// Running audit pipeline
///
/// Dropping the agent shuts the pipeline down and joins the consumer thread.
#[derive(Debug)]
pub struct AuditAgent {
    queue: Arc<EventQueue>,
    join: Option<JoinHandle<()>>,
}

impl AuditAgent {
    /// Build the registry, start the consumer thread and announce startup
    ///
    /// Fails if the configuration is invalid, the descriptor cannot be
    /// turned into a registry, or the consumer thread cannot be spawned.
    pub fn start(
        config: AuditConfig,
        descriptor: impl Into<ModuleDescriptor>,
        sink: impl AuditSink + 'static,
        log: LogContext,
    ) -> Result<Self> {
        if let Err(e) = config.validate() {
            log.report(e.code(), Some(&e.to_string()));
            return Err(e.into());
        }

        let registry = descriptor.into().build(&config).map_err(|e| {
            log.report(e.code(), Some(&e.to_string()));
            Error::from(e)
        })?;

        Self::spawn(registry, config, Box::new(sink), log)
    }

    /// Start from a JSON config file, writing to a [`FileSink`]
    ///
    /// The descriptor is read from `descriptors_path`, which must be set.
    pub fn start_from_file(path: impl AsRef<Path>, log: LogContext) -> Result<Self> {
        let config = AuditConfig::load_from(path)?;
        init_tracing(&config.log_level)?;

        let descriptor = config
            .descriptors_path
            .clone()
            .ok_or(ConfigError::MissingDescriptorsPath)?;
        let sink = FileSink::new(&config, log.hostname())?;

        Self::start(config, descriptor, sink, log)
    }

    fn spawn(
        registry: EventRegistry,
        config: AuditConfig,
        sink: Box<dyn AuditSink>,
        log: LogContext,
    ) -> Result<Self> {
        let auditd_enabled = config.auditd_enabled;
        let event_types = registry.len();
        let queue = Arc::new(EventQueue::new(registry, config, log.clone()));

        let consumer = Consumer {
            queue: Arc::clone(&queue),
            processor: EventProcessor::new(log.clone()),
            sink,
            log: log.clone(),
        };
        let join = thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || consumer.run())
            .map_err(|e| {
                log.report(ErrorCode::CreateThread, Some(&e.to_string()));
                Error::Thread(e)
            })?;

        tracing::info!(
            service_name = %log.service_name(),
            event_types,
            "Audit consumer started"
        );

        if auditd_enabled {
            queue.emit_lifecycle(LifecycleEvent::DaemonStarted);
        }

        Ok(Self {
            queue,
            join: Some(join),
        })
    }

    /// Cloneable producer handle
    pub fn logger(&self) -> AuditLogger {
        AuditLogger::new(Arc::clone(&self.queue))
    }

    /// Announce shutdown, flush what is queued and join the consumer
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };

        if self.queue.config().auditd_enabled {
            self.queue.emit_lifecycle(LifecycleEvent::ShutdownImminent);
        }
        self.queue.shutdown();

        if join.join().is_err() {
            tracing::error!("Audit consumer thread panicked");
            self.queue.mark_consumer_stopped();
        }
    }
}

impl Drop for AuditAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the consumer thread
struct Consumer {
    queue: Arc<EventQueue>,
    processor: EventProcessor,
    sink: Box<dyn AuditSink>,
    log: LogContext,
}

impl Consumer {
    fn run(mut self) {
        loop {
            match self.queue.next_step(self.sink.time_to_rotation()) {
                Step::Batch { events, registry } => {
                    self.process_batch(events, &registry);
                    self.rotate_if_due();
                }
                Step::Reload {
                    events,
                    registry,
                    request,
                } => {
                    self.process_batch(events, &registry);
                    self.apply_reload(request);
                }
                Step::Terminate { events, registry } => {
                    self.process_batch(events, &registry);
                    break;
                }
                Step::Idle => self.rotate_if_due(),
            }
        }

        if let Err(e) = self.sink.close() {
            self.log.report(e.code(), Some(&e.to_string()));
        }
        self.queue.mark_consumer_stopped();
        tracing::info!("Audit consumer stopped");
    }

    fn process_batch(&mut self, events: VecDeque<Event>, registry: &EventRegistry) {
        for event in events {
            match self.processor.process(&event, registry, self.sink.as_mut()) {
                Ok(()) => self.queue.stats.record_written(),
                Err(e) => {
                    self.queue.stats.record_dropped();
                    self.log.report(e.code(), Some(&event.payload));
                }
            }
        }
    }

    fn rotate_if_due(&mut self) {
        if let Err(e) = self.sink.rotate_if_due() {
            self.log.report(e.code(), Some(&e.to_string()));
        }
    }

    fn apply_reload(&mut self, request: ReloadRequest) {
        let Some(applied) = self.queue.apply_reload(request) else {
            return;
        };

        if let Err(e) = self.sink.reconfigure(&applied.current) {
            self.log.report(e.code(), Some(&e.to_string()));
        }

        if applied.previous.auditd_enabled && !applied.current.auditd_enabled {
            self.queue.emit_lifecycle(LifecycleEvent::DaemonStopped);
        } else if applied.current.auditd_enabled {
            self.queue.emit_lifecycle(LifecycleEvent::ConfigChanged);
        }
    }
}
