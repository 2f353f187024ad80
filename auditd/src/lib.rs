//! # auditd
//!
//! Audit-event pipeline for an embedded storage engine.
//!
//! Request-handling threads submit security and operational events
//! (connections, authentication, admin operations, configuration changes).
//! Each event type is checked against a schema registry, buffered in a
//! double-buffered queue and written in arrival order by a single consumer
//! thread. Configuration can be reloaded while producers keep submitting.
//!
//! ## Example
//!
//! ```rust,no_run
//! use auditd::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = AuditConfig {
//!         enabled_ids: [4096].into_iter().collect(),
//!         ..Default::default()
//!     };
//!     let descriptor = r#"[[{"id":4096,"name":"auth success","description":"d"}]]"#;
//!     let sink = FileSink::new(&config, "node1.example.com")?;
//!
//!     let mut agent = AuditAgent::start(config, descriptor, sink, LogContext::default())?;
//!     let logger = agent.logger();
//!
//!     logger.submit(
//!         4096,
//!         br#"{"timestamp":"2024-01-01T00:00:00.000Z","user":"bob"}"#,
//!     );
//!
//!     agent.shutdown();
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod error;
pub mod observability;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{
        AuditAgent, AuditConfig, AuditLogger, AuditSink, EventDescriptor, EventRegistry,
        FileSink, LifecycleEvent, MemorySink, ModuleDescriptor, ReloadError, SinkError,
        StatsSnapshot,
    };
    pub use crate::error::{Error, ErrorCode, ErrorKind, Result};
    pub use crate::observability::{init_tracing, LogContext};
}
