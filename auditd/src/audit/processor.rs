//! Event processing: validate a queued event and format its audit line
//!
//! Runs on the consumer thread only. A bad event is reported and dropped;
//! it never stops the consumer.

use serde_json::value::RawValue;
use serde_json::Value;
use thiserror::Error;

use super::event::{Event, EventDescriptor, PayloadFields};
use super::registry::EventRegistry;
use super::storage::{AuditSink, SinkError};
use super::timestamp::is_timestamp_well_formed;
use crate::error::ErrorCode;
use crate::observability::LogContext;

/// Why a queued event was not written
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no timestamp")]
    TimestampMissing,

    #[error("malformed timestamp {0}")]
    TimestampFormat(String),

    #[error("event id {0} is not in the registry")]
    UnknownId(u32),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ProcessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) | Self::NotAnObject => ErrorCode::JsonParsing,
            Self::TimestampMissing => ErrorCode::TimestampMissing,
            Self::TimestampFormat(_) => ErrorCode::TimestampFormat,
            Self::UnknownId(_) => ErrorCode::EventId,
            Self::Sink(e) => e.code(),
        }
    }
}

/// Turns queued events into audit lines and hands them to the sink
#[derive(Debug, Clone)]
pub struct EventProcessor {
    log: LogContext,
}

impl EventProcessor {
    pub fn new(log: LogContext) -> Self {
        Self { log }
    }

    /// Validate, format and write one event
    pub fn process(
        &self,
        event: &Event,
        registry: &EventRegistry,
        sink: &mut dyn AuditSink,
    ) -> Result<(), ProcessError> {
        let payload: &RawValue = serde_json::from_str(&event.payload)?;
        if !payload.get().starts_with('{') {
            return Err(ProcessError::NotAnObject);
        }
        let mut fields: PayloadFields = serde_json::from_str(payload.get())?;

        let raw_timestamp = fields
            .remove("timestamp")
            .ok_or(ProcessError::TimestampMissing)?;
        let timestamp = match serde_json::from_str::<Value>(raw_timestamp.get()) {
            Ok(Value::String(ts)) if is_timestamp_well_formed(&ts) => ts,
            Ok(Value::String(ts)) => return Err(ProcessError::TimestampFormat(ts)),
            _ => return Err(ProcessError::TimestampFormat(raw_timestamp.get().to_string())),
        };

        let descriptor = registry
            .lookup(event.id)
            .ok_or(ProcessError::UnknownId(event.id))?;

        let missing = descriptor.missing_fields(&fields);
        if !missing.is_empty() {
            tracing::debug!(
                event_id = event.id,
                missing = ?missing,
                "Event is missing mandatory fields"
            );
        }

        if !sink.open_time_is_set() {
            if let Err(e) = sink.set_open_time(&timestamp) {
                self.log.report(e.code(), Some(&timestamp));
            }
        }

        let line = format_audit_line(&timestamp, descriptor, &fields);
        sink.write_line(&line, descriptor.sync)?;
        Ok(())
    }
}

/// Build the on-disk line for one event
///
/// The line is a fixed prefix of timestamp, id, name and description,
/// followed by the remaining payload fields in their original order:
///
/// ```text
/// {"timestamp":"2024-01-01T00:00:00.000Z","id":4096,"name":"auth success","desc":"d","user":"bob"}
/// ```
///
/// Remaining values are copied as the producer wrote them. `rest` must not
/// contain `timestamp`; the caller removes it so the line carries exactly one.
pub fn format_audit_line(
    timestamp: &str,
    descriptor: &EventDescriptor,
    rest: &PayloadFields,
) -> String {
    let mut line = String::with_capacity(128);
    line.push_str("{\"timestamp\":");
    push_json_string(&mut line, timestamp);
    line.push_str(",\"id\":");
    line.push_str(&descriptor.id.to_string());
    line.push_str(",\"name\":");
    push_json_string(&mut line, &descriptor.name);
    line.push_str(",\"desc\":");
    push_json_string(&mut line, &descriptor.description);

    for (key, value) in rest.iter() {
        line.push(',');
        push_json_string(&mut line, key);
        line.push(':');
        line.push_str(value.get());
    }

    line.push('}');
    line
}

fn push_json_string(line: &mut String, s: &str) {
    line.push_str(&Value::from(s).to_string());
}
