//! In-memory sink
//!
//! Clones share the same buffer, so a caller can keep one handle while the
//! other is moved into the consumer thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{AuditSink, SinkError};
use crate::audit::timestamp::is_timestamp_well_formed;

#[derive(Debug, Default)]
struct MemoryState {
    lines: Vec<String>,
    synced: usize,
    open_time: Option<String>,
    closed: bool,
}

/// Sink that records every line in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Number of lines written with `sync` set
    pub fn synced(&self) -> usize {
        self.state().synced
    }

    pub fn open_time(&self) -> Option<String> {
        self.state().open_time.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl AuditSink for MemorySink {
    fn open_time_is_set(&self) -> bool {
        self.state().open_time.is_some()
    }

    fn set_open_time(&mut self, timestamp: &str) -> Result<(), SinkError> {
        if !is_timestamp_well_formed(timestamp) {
            return Err(SinkError::OpenTime {
                timestamp: timestamp.to_string(),
            });
        }
        self.state().open_time = Some(timestamp.to_string());
        Ok(())
    }

    fn write_line(&mut self, line: &str, sync: bool) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.lines.push(line.to_string());
        if sync {
            state.synced += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.state().closed = true;
        Ok(())
    }
}
