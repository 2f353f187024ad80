//! Audit daemon configuration
//!
//! Loaded from a JSON file (the daemon's native format) layered over
//! defaults and `AUDITD_`-prefixed environment variables.

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::error::{ErrorCode, Result};

/// Only configuration format version understood by this daemon
pub const AUDIT_CONFIG_VERSION: u32 = 1;

/// Shortest accepted rotation interval (15 minutes)
pub const MIN_ROTATE_INTERVAL_SECS: u64 = 15 * 60;

/// Longest accepted rotation interval (7 days)
pub const MAX_ROTATE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default rotation interval (1 day)
pub const DEFAULT_ROTATE_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Audit configuration snapshot
///
/// Immutable once handed to the pipeline; a reload replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Configuration format version (must be 1)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Emit lifecycle events and treat the daemon as switched on
    #[serde(default)]
    pub auditd_enabled: bool,

    /// Seconds between log rotations
    #[serde(default = "default_rotate_interval")]
    pub rotate_interval: u64,

    /// Directory the live audit log is written to
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Directory rotated logs are moved into
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,

    /// Module descriptor file, when the descriptor is not supplied in memory
    #[serde(default)]
    pub descriptors_path: Option<PathBuf>,

    /// Event ids that are queued; everything else is filtered at submission
    #[serde(default, rename = "enabled")]
    pub enabled_ids: BTreeSet<u32>,

    /// Event ids the sink should flush synchronously
    #[serde(default, rename = "sync")]
    pub sync_ids: BTreeSet<u32>,

    /// Ceiling on the fill queue; `None` means unbounded
    #[serde(default)]
    pub max_queue_depth: Option<usize>,

    /// Account recorded as the principal of lifecycle events
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Tracing filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            auditd_enabled: false,
            rotate_interval: default_rotate_interval(),
            log_path: default_log_path(),
            archive_path: default_archive_path(),
            descriptors_path: None,
            enabled_ids: BTreeSet::new(),
            sync_ids: BTreeSet::new(),
            max_queue_depth: None,
            service_account: default_service_account(),
            log_level: default_log_level(),
        }
    }
}

impl AuditConfig {
    /// Load configuration from a specific JSON file
    ///
    /// Layers, later wins: built-in defaults, the file, then `AUDITD_*`
    /// environment variables. The result is validated before it is returned.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: AuditConfig = Figment::new()
            .merge(Serialized::defaults(AuditConfig::default()))
            .merge(Json::file(path.as_ref()))
            .merge(Env::prefixed("AUDITD_"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check bounds and required values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.version != AUDIT_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
            });
        }
        if self.rotate_interval < MIN_ROTATE_INTERVAL_SECS {
            return Err(ConfigError::RotateIntervalBelowMin {
                value: self.rotate_interval,
                min: MIN_ROTATE_INTERVAL_SECS,
            });
        }
        if self.rotate_interval > MAX_ROTATE_INTERVAL_SECS {
            return Err(ConfigError::RotateIntervalExceedsMax {
                value: self.rotate_interval,
                max: MAX_ROTATE_INTERVAL_SECS,
            });
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath { field: "log_path" });
        }
        if self.archive_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath {
                field: "archive_path",
            });
        }
        Ok(())
    }

    pub fn is_enabled(&self, id: u32) -> bool {
        self.enabled_ids.contains(&id)
    }

    pub fn is_sync(&self, id: u32) -> bool {
        self.sync_ids.contains(&id)
    }

    pub fn rotate_interval_duration(&self) -> Duration {
        Duration::from_secs(self.rotate_interval)
    }
}

/// Configuration rejected by [`AuditConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported audit config version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("rotate_interval {value}s is below the minimum of {min}s")]
    RotateIntervalBelowMin { value: u64, min: u64 },

    #[error("rotate_interval {value}s exceeds the maximum of {max}s")]
    RotateIntervalExceedsMax { value: u64, max: u64 },

    #[error("{field} must not be empty")]
    EmptyPath { field: &'static str },

    #[error("descriptors_path is not set")]
    MissingDescriptorsPath,
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::Version,
            Self::RotateIntervalBelowMin { .. } => ErrorCode::RotateIntervalBelowMin,
            Self::RotateIntervalExceedsMax { .. } => ErrorCode::RotateIntervalExceedsMax,
            Self::EmptyPath { .. } | Self::MissingDescriptorsPath => ErrorCode::ValidatePath,
        }
    }
}

fn default_version() -> u32 {
    AUDIT_CONFIG_VERSION
}

fn default_rotate_interval() -> u64 {
    DEFAULT_ROTATE_INTERVAL_SECS
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/log/auditd")
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("/var/log/auditd/archive")
}

fn default_service_account() -> String {
    "auditd".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
