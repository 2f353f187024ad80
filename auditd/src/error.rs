//! Error types and centralized error codes
//!
//! Every failure in the pipeline maps onto an [`ErrorCode`], and every code
//! belongs to one [`ErrorKind`]. Components never panic on bad input; they
//! return one of the typed errors below and report it once through
//! [`LogContext::report`](crate::observability::LogContext::report).

use std::fmt;
use thiserror::Error;

use crate::audit::config::ConfigError;
use crate::audit::reload::ReloadError;
use crate::audit::registry::SchemaError;
use crate::audit::storage::SinkError;

/// Coarse category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File open/rename/remove/attribute failures
    Io,
    /// Malformed module descriptor or event payload
    Schema,
    /// Submissions the pipeline refuses to queue
    Protocol,
    /// Queue capacity exhaustion
    Resource,
    /// Configuration values outside accepted bounds
    Configuration,
    /// Consumer thread lifecycle failures
    Threading,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "io"),
            Self::Schema => write!(f, "schema"),
            Self::Protocol => write!(f, "protocol"),
            Self::Resource => write!(f, "resource"),
            Self::Configuration => write!(f, "configuration"),
            Self::Threading => write!(f, "threading"),
        }
    }
}

/// Specific failure reported through the centralized logging call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FileAttributes,
    FileOpen,
    FileRename,
    FileRemove,
    FileWrite,
    JsonParsing,
    JsonMissingData,
    JsonKey,
    JsonId,
    JsonUnknownField,
    CreateThread,
    TimestampMissing,
    TimestampFormat,
    EventId,
    Version,
    ValidatePath,
    RotateIntervalBelowMin,
    RotateIntervalExceedsMax,
    DroppingEvent,
    SettingOpenTime,
    ReloadAborted,
}

impl ErrorCode {
    /// Category this code is reported under
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::FileAttributes
            | Self::FileOpen
            | Self::FileRename
            | Self::FileRemove
            | Self::FileWrite
            | Self::SettingOpenTime => ErrorKind::Io,
            Self::JsonParsing
            | Self::JsonMissingData
            | Self::JsonKey
            | Self::JsonId
            | Self::JsonUnknownField
            | Self::TimestampMissing
            | Self::TimestampFormat => ErrorKind::Schema,
            Self::EventId => ErrorKind::Protocol,
            Self::DroppingEvent => ErrorKind::Resource,
            Self::Version
            | Self::ValidatePath
            | Self::RotateIntervalBelowMin
            | Self::RotateIntervalExceedsMax
            | Self::ReloadAborted => ErrorKind::Configuration,
            Self::CreateThread => ErrorKind::Threading,
        }
    }

    /// Stable snake_case identifier used as a structured log field
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileAttributes => "file_attributes_error",
            Self::FileOpen => "file_open_error",
            Self::FileRename => "file_rename_error",
            Self::FileRemove => "file_remove_error",
            Self::FileWrite => "file_write_error",
            Self::JsonParsing => "json_parsing_error",
            Self::JsonMissingData => "json_missing_data_error",
            Self::JsonKey => "json_key_error",
            Self::JsonId => "json_id_error",
            Self::JsonUnknownField => "json_unknown_field_error",
            Self::CreateThread => "create_thread_error",
            Self::TimestampMissing => "timestamp_missing_error",
            Self::TimestampFormat => "timestamp_format_error",
            Self::EventId => "event_id_error",
            Self::Version => "version_error",
            Self::ValidatePath => "validate_path_error",
            Self::RotateIntervalBelowMin => "rotate_interval_below_min_error",
            Self::RotateIntervalExceedsMax => "rotate_interval_exceeds_max_error",
            Self::DroppingEvent => "dropping_event_error",
            Self::SettingOpenTime => "setting_open_time_error",
            Self::ReloadAborted => "reload_aborted_error",
        }
    }

    /// Human readable summary; the optional context string is appended by the reporter
    pub fn message(self) -> &'static str {
        match self {
            Self::FileAttributes => "attributes error on file",
            Self::FileOpen => "open error on file",
            Self::FileRename => "rename error on file",
            Self::FileRemove => "remove error on file",
            Self::FileWrite => "write error on file",
            Self::JsonParsing => "JSON parsing error",
            Self::JsonMissingData => "JSON missing data error",
            Self::JsonKey => "JSON key error",
            Self::JsonId => "JSON event id error",
            Self::JsonUnknownField => "JSON unknown field error",
            Self::CreateThread => "failed to create consumer thread",
            Self::TimestampMissing => "timestamp missing error",
            Self::TimestampFormat => "timestamp format error",
            Self::EventId => "event id error",
            Self::Version => "audit version error",
            Self::ValidatePath => "validate path error",
            Self::RotateIntervalBelowMin => "rotate_interval below minimum",
            Self::RotateIntervalExceedsMax => "rotate_interval exceeds maximum",
            Self::DroppingEvent => "dropping event",
            Self::SettingOpenTime => "error setting audit file open time",
            Self::ReloadAborted => "configuration reload aborted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be extracted from its sources
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Configuration was extracted but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Module descriptor could not be turned into a registry
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Log sink failure
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Reload request failed or was abandoned
    #[error("Reload error: {0}")]
    Reload(#[from] ReloadError),

    /// Consumer thread could not be spawned
    #[error("Failed to spawn consumer thread: {0}")]
    Thread(std::io::Error),
}

impl Error {
    /// Code under which this error is reported
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Config(_) => ErrorCode::JsonParsing,
            Error::InvalidConfig(e) => e.code(),
            Error::Schema(e) => e.code(),
            Error::Sink(e) => e.code(),
            Error::Reload(e) => e.code(),
            Error::Thread(_) => ErrorCode::CreateThread,
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_kinds() {
        assert_eq!(ErrorCode::FileRename.kind(), ErrorKind::Io);
        assert_eq!(ErrorCode::JsonUnknownField.kind(), ErrorKind::Schema);
        assert_eq!(ErrorCode::EventId.kind(), ErrorKind::Protocol);
        assert_eq!(ErrorCode::DroppingEvent.kind(), ErrorKind::Resource);
        assert_eq!(
            ErrorCode::RotateIntervalBelowMin.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(ErrorCode::CreateThread.kind(), ErrorKind::Threading);
    }

    #[test]
    fn test_thread_error_is_threading_kind() {
        let err = Error::Thread(std::io::Error::other("no threads left"));
        assert_eq!(err.code(), ErrorCode::CreateThread);
        assert_eq!(err.kind(), ErrorKind::Threading);
        assert!(err.to_string().contains("no threads left"));
    }

    #[test]
    fn test_io_failures_surface_through_sink_codes() {
        let err = Error::from(SinkError::Rename {
            from: "logs/audit.log".into(),
            to: "archive/node1-audit.log".into(),
            source: std::io::Error::other("cross-device link"),
        });
        assert_eq!(err.code(), ErrorCode::FileRename);
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = Error::from(SinkError::Closed);
        assert_eq!(err.code(), ErrorCode::FileWrite);
    }

    #[test]
    fn test_code_display_is_snake_case() {
        assert_eq!(ErrorCode::JsonParsing.to_string(), "json_parsing_error");
        assert_eq!(ErrorKind::Configuration.to_string(), "configuration");
    }
}
