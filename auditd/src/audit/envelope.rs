//! Lifecycle event envelopes
//!
//! The daemon reports its own lifecycle through the same pipeline as every
//! other producer. The envelope builder fills in the fields those events
//! carry: a timestamp and the internal principal, plus a snapshot of the
//! configuration for the "full" kinds.

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::config::AuditConfig;
use super::timestamp::generate_timestamp;
use crate::error::ErrorCode;

/// Principal source recorded on lifecycle events
pub const INTERNAL_SOURCE: &str = "internal";

/// Events the daemon emits about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Daemon configured and running
    DaemonStarted,
    /// Auditing switched off by a reload
    DaemonStopped,
    /// New configuration applied
    ConfigChanged,
    /// Consumer about to exit
    ShutdownImminent,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 4] = [
        Self::DaemonStarted,
        Self::DaemonStopped,
        Self::ConfigChanged,
        Self::ShutdownImminent,
    ];

    pub fn id(self) -> u32 {
        match self {
            Self::DaemonStarted => 0x1000,
            Self::DaemonStopped => 0x1001,
            Self::ConfigChanged => 0x1002,
            Self::ShutdownImminent => 0x1003,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.id() == id)
    }

    /// Full envelopes carry the configuration snapshot
    pub fn is_full(self) -> bool {
        matches!(self, Self::DaemonStarted | Self::ConfigChanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("event id {id:#x} is not a lifecycle event")]
    UnknownId { id: u32 },
}

impl EnvelopeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::EventId
    }
}

/// Add the lifecycle fields for `id` to `payload`
///
/// Nothing is added when `id` is not a lifecycle event.
pub fn build_envelope(
    id: u32,
    payload: &mut Map<String, Value>,
    config: &AuditConfig,
) -> Result<(), EnvelopeError> {
    let event = LifecycleEvent::from_id(id).ok_or(EnvelopeError::UnknownId { id })?;
    let principal = json!({
        "source": INTERNAL_SOURCE,
        "user": config.service_account,
    });

    payload.insert("timestamp".to_string(), Value::String(generate_timestamp()));
    if event.is_full() {
        payload.insert(
            "archive_path".to_string(),
            Value::String(config.archive_path.display().to_string()),
        );
        payload.insert("auditd_enabled".to_string(), Value::Bool(config.auditd_enabled));
        payload.insert(
            "log_path".to_string(),
            Value::String(config.log_path.display().to_string()),
        );
        payload.insert("real_userid".to_string(), principal);
        payload.insert("rotate_interval".to_string(), json!(config.rotate_interval));
        payload.insert("version".to_string(), json!(config.version));
    } else {
        payload.insert("real_userid".to_string(), principal);
    }
    Ok(())
}

/// Serialized payload for a lifecycle event, ready for submission
pub fn lifecycle_payload(event: LifecycleEvent, config: &AuditConfig) -> String {
    let mut payload = Map::new();
    // from_id(event.id()) always succeeds
    let _ = build_envelope(event.id(), &mut payload, config);
    Value::Object(payload).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::timestamp::is_timestamp_well_formed;

    fn keys(payload: &Map<String, Value>) -> Vec<&str> {
        payload.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_ids_round_trip() {
        for event in LifecycleEvent::ALL {
            assert_eq!(LifecycleEvent::from_id(event.id()), Some(event));
        }
        assert_eq!(LifecycleEvent::from_id(0x1004), None);
    }

    #[test]
    fn test_full_envelope() {
        let config = AuditConfig {
            auditd_enabled: true,
            rotate_interval: 3600,
            log_path: "/tmp/logs".into(),
            archive_path: "/tmp/archive".into(),
            ..Default::default()
        };
        let mut payload = Map::new();
        build_envelope(0x1000, &mut payload, &config).unwrap();

        assert_eq!(
            keys(&payload),
            vec![
                "timestamp",
                "archive_path",
                "auditd_enabled",
                "log_path",
                "real_userid",
                "rotate_interval",
                "version"
            ]
        );
        assert!(is_timestamp_well_formed(payload["timestamp"].as_str().unwrap()));
        assert_eq!(payload["archive_path"], "/tmp/archive");
        assert_eq!(payload["auditd_enabled"], true);
        assert_eq!(payload["rotate_interval"], 3600);
        assert_eq!(payload["version"], 1);
        assert_eq!(
            payload["real_userid"],
            json!({"source": "internal", "user": "auditd"})
        );
    }

    #[test]
    fn test_lightweight_envelope() {
        let config = AuditConfig {
            service_account: "storage-engine".to_string(),
            ..Default::default()
        };
        let mut payload = Map::new();
        payload.insert("reason".to_string(), json!("operator request"));
        build_envelope(LifecycleEvent::ShutdownImminent.id(), &mut payload, &config).unwrap();

        assert_eq!(keys(&payload), vec!["reason", "timestamp", "real_userid"]);
        assert_eq!(payload["real_userid"]["user"], "storage-engine");
    }

    #[test]
    fn test_unknown_id_adds_nothing() {
        let mut payload = Map::new();
        let err = build_envelope(4096, &mut payload, &AuditConfig::default()).unwrap_err();
        assert_eq!(err, EnvelopeError::UnknownId { id: 4096 });
        assert_eq!(err.code(), ErrorCode::EventId);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_lifecycle_payload_is_json_object() {
        let text = lifecycle_payload(LifecycleEvent::ConfigChanged, &AuditConfig::default());
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("archive_path").is_some());
    }
}
