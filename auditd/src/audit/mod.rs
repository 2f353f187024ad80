//! Audit event pipeline
//!
//! Accepts audit events from many request-handling threads and writes them,
//! in arrival order, through a single consumer thread.
//!
//! # Architecture
//!
//! - [`EventRegistry`] maps event ids to names, descriptions and the
//!   `enabled`/`sync` flags taken from [`AuditConfig`].
//! - [`EventQueue`] is a double-buffered queue: producers fill one side while
//!   the consumer drains the other, swapping when the drained side is empty.
//! - The consumer thread owned by [`AuditAgent`] formats each event with the
//!   [`EventProcessor`] and hands the line to an [`AuditSink`].
//! - Reloads swap the registry and configuration between batches, after
//!   every previously queued event has been written.
//!
//! Producers use the cloneable [`AuditLogger`]; submission never waits on
//! the consumer or the sink.

pub mod agent;
pub mod config;
pub mod envelope;
pub mod event;
pub mod logger;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod reload;
pub mod stats;
pub mod storage;
pub mod timestamp;

pub use agent::AuditAgent;
pub use config::{AuditConfig, ConfigError};
pub use envelope::{build_envelope, EnvelopeError, LifecycleEvent};
pub use event::{Event, EventDescriptor, PayloadFields};
pub use logger::AuditLogger;
pub use processor::{format_audit_line, EventProcessor, ProcessError};
pub use queue::EventQueue;
pub use registry::{EventRegistry, ModuleDescriptor, SchemaError};
pub use reload::{ReloadError, ReloadState};
pub use stats::{PipelineStats, StatsSnapshot};
pub use storage::{AuditSink, FileSink, MemorySink, SinkError};
pub use timestamp::{format_timestamp, generate_timestamp, is_timestamp_well_formed};
