//! Audit log sinks
//!
//! The `AuditSink` trait is the contract between the consumer thread and
//! whatever persists formatted audit lines. The sink is owned by the consumer
//! thread, so implementations need `Send` but never `Sync`.
//!
//! # Available Sinks
//!
//! - [`MemorySink`]: keeps lines in memory, cloneable handle for inspection
//! - [`FileSink`]: appends to `<log_path>/audit.log`, rotating into `archive_path`

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::config::AuditConfig;
use crate::error::ErrorCode;

pub mod file;
pub mod memory;

pub use file::FileSink;
pub use memory::MemorySink;

/// Destination for formatted audit lines
pub trait AuditSink: Send {
    /// Whether the current log file has recorded its open time
    fn open_time_is_set(&self) -> bool;

    /// Record the timestamp of the first event written to the current file
    fn set_open_time(&mut self, timestamp: &str) -> Result<(), SinkError>;

    /// Persist one line; `sync` asks for it to be flushed before returning
    fn write_line(&mut self, line: &str, sync: bool) -> Result<(), SinkError>;

    /// Apply a new configuration snapshot after a reload
    fn reconfigure(&mut self, _config: &AuditConfig) -> Result<(), SinkError> {
        Ok(())
    }

    /// Time until the next rotation is due, if the sink rotates at all
    fn time_to_rotation(&self) -> Option<Duration> {
        None
    }

    /// Rotate the current file if its interval has elapsed
    fn rotate_if_due(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Flush and release the sink; called once when the consumer exits
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Failure inside a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read attributes of {path}: {source}")]
    Attributes {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot use '{timestamp}' as the log open time")]
    OpenTime { timestamp: String },

    #[error("sink is closed")]
    Closed,
}

impl SinkError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Open { .. } => ErrorCode::FileOpen,
            Self::Write { .. } | Self::Closed => ErrorCode::FileWrite,
            Self::Rename { .. } => ErrorCode::FileRename,
            Self::Remove { .. } => ErrorCode::FileRemove,
            Self::Attributes { .. } => ErrorCode::FileAttributes,
            Self::OpenTime { .. } => ErrorCode::SettingOpenTime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl AuditSink for NullSink {
        fn open_time_is_set(&self) -> bool {
            true
        }

        fn set_open_time(&mut self, _timestamp: &str) -> Result<(), SinkError> {
            Ok(())
        }

        fn write_line(&mut self, _line: &str, _sync: bool) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_methods_are_no_ops() {
        let mut sink = NullSink;
        assert!(sink.reconfigure(&AuditConfig::default()).is_ok());
        assert!(sink.time_to_rotation().is_none());
        assert!(sink.rotate_if_due().is_ok());
        assert!(sink.close().is_ok());
    }

    #[test]
    fn test_sink_error_codes() {
        let io = || std::io::Error::other("boom");
        assert_eq!(
            SinkError::Rename {
                from: "a".into(),
                to: "b".into(),
                source: io()
            }
            .code(),
            ErrorCode::FileRename
        );
        assert_eq!(SinkError::Closed.code(), ErrorCode::FileWrite);
        assert_eq!(
            SinkError::OpenTime {
                timestamp: "x".into()
            }
            .code(),
            ErrorCode::SettingOpenTime
        );
    }
}
