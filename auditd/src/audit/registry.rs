//! Event schema registry
//!
//! Built from a module descriptor: a JSON document listing, per module, the
//! event types that module can emit. The registry maps each event id to its
//! [`EventDescriptor`], with the `enabled`/`sync` flags taken from the
//! [`AuditConfig`] rather than from the descriptor.
//!
//! Accepted descriptor shapes:
//!
//! ```json
//! [ [ {"id": 4096, "name": "...", "description": "..."} ] ]
//! [ {"module": "auth", "events": [ {...} ]} ]
//! {"version": 1, "modules": [ {"module": "auth", "events": [ {...} ]} ]}
//! ```
//!
//! Any malformed definition aborts the whole load; a partially built registry
//! is never returned.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::config::AuditConfig;
use super::event::EventDescriptor;
use crate::error::ErrorCode;

/// One entry of a module's event array, as written in the descriptor
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventDefinition {
    id: u32,
    name: String,
    description: String,
    // Placeholders only: effective flags come from the config
    #[serde(default)]
    #[allow(dead_code)]
    sync: bool,
    #[serde(default)]
    #[allow(dead_code)]
    enabled: bool,
    #[serde(default)]
    mandatory_fields: FieldNames,
    #[serde(default)]
    optional_fields: FieldNames,
}

/// Field names given either as a list or as the keys of an example object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldNames {
    List(Vec<String>),
    Object(Map<String, Value>),
}

impl Default for FieldNames {
    fn default() -> Self {
        FieldNames::List(Vec::new())
    }
}

impl FieldNames {
    fn into_names(self) -> Vec<String> {
        match self {
            FieldNames::List(names) => names,
            FieldNames::Object(map) => map.into_iter().map(|(name, _)| name).collect(),
        }
    }
}

/// Descriptor rejected while building a registry
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("descriptor is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{location} is empty")]
    MissingData { location: String },

    #[error("unexpected {found} at {location}")]
    UnexpectedKind {
        location: String,
        found: &'static str,
    },

    #[error("{location} has no id")]
    MissingId { location: String },

    #[error("{location} uses reserved event id 0")]
    ZeroId { location: String },

    #[error("{location} is invalid: {reason}")]
    InvalidDefinition { location: String, reason: String },
}

impl SchemaError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) => ErrorCode::JsonParsing,
            Self::Read { .. } => ErrorCode::FileOpen,
            Self::MissingData { .. } => ErrorCode::JsonMissingData,
            Self::UnexpectedKind { .. } => ErrorCode::JsonUnknownField,
            Self::MissingId { .. } | Self::ZeroId { .. } => ErrorCode::JsonId,
            Self::InvalidDefinition { .. } => ErrorCode::JsonKey,
        }
    }
}

/// Where a module descriptor comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleDescriptor {
    /// Descriptor JSON held in memory
    Text(String),
    /// Descriptor JSON read from disk on every build
    File(PathBuf),
}

impl ModuleDescriptor {
    /// Build a registry from this descriptor with flags from `config`
    pub fn build(&self, config: &AuditConfig) -> Result<EventRegistry, SchemaError> {
        match self {
            ModuleDescriptor::Text(text) => EventRegistry::load(text, config),
            ModuleDescriptor::File(path) => EventRegistry::load_file(path, config),
        }
    }
}

impl From<&str> for ModuleDescriptor {
    fn from(text: &str) -> Self {
        ModuleDescriptor::Text(text.to_string())
    }
}

impl From<String> for ModuleDescriptor {
    fn from(text: String) -> Self {
        ModuleDescriptor::Text(text)
    }
}

impl From<PathBuf> for ModuleDescriptor {
    fn from(path: PathBuf) -> Self {
        ModuleDescriptor::File(path)
    }
}

/// Lookup table from event id to descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRegistry {
    events: BTreeMap<u32, EventDescriptor>,
}

impl EventRegistry {
    /// Build a registry from descriptor text
    pub fn load(descriptor: &str, config: &AuditConfig) -> Result<Self, SchemaError> {
        let document: Value = serde_json::from_str(descriptor)?;
        Self::from_value(&document, config)
    }

    /// Build a registry from a descriptor file on disk
    pub fn load_file(path: impl AsRef<Path>, config: &AuditConfig) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&text, config)
    }

    /// Build a registry from an already parsed descriptor
    pub fn from_value(document: &Value, config: &AuditConfig) -> Result<Self, SchemaError> {
        let mut registry = EventRegistry::default();

        match document {
            Value::Array(modules) => registry.add_modules(modules, config)?,
            Value::Object(fields) => {
                for (key, value) in fields {
                    match value {
                        Value::Number(_) | Value::String(_) => {}
                        Value::Array(modules) => registry.add_modules(modules, config)?,
                        other => {
                            return Err(SchemaError::UnexpectedKind {
                                location: format!("descriptor key '{}'", key),
                                found: kind_name(other),
                            })
                        }
                    }
                }
            }
            other => {
                return Err(SchemaError::UnexpectedKind {
                    location: "descriptor root".to_string(),
                    found: kind_name(other),
                })
            }
        }

        tracing::debug!(event_types = registry.len(), "Event registry built");
        Ok(registry)
    }

    fn add_modules(&mut self, modules: &[Value], config: &AuditConfig) -> Result<(), SchemaError> {
        for (index, module) in modules.iter().enumerate() {
            let location = format!("module {}", index);
            match module {
                Value::Array(definitions) => self.add_definitions(&location, definitions, config)?,
                Value::Object(fields) => {
                    if fields.is_empty() {
                        return Err(SchemaError::MissingData { location });
                    }
                    for (key, value) in fields {
                        match value {
                            Value::Number(_) | Value::String(_) => {}
                            Value::Array(definitions) => self.add_definitions(
                                &format!("{} '{}'", location, key),
                                definitions,
                                config,
                            )?,
                            other => {
                                return Err(SchemaError::UnexpectedKind {
                                    location: format!("{} key '{}'", location, key),
                                    found: kind_name(other),
                                })
                            }
                        }
                    }
                }
                other => {
                    return Err(SchemaError::UnexpectedKind {
                        location,
                        found: kind_name(other),
                    })
                }
            }
        }
        Ok(())
    }

    fn add_definitions(
        &mut self,
        module: &str,
        definitions: &[Value],
        config: &AuditConfig,
    ) -> Result<(), SchemaError> {
        for (index, definition) in definitions.iter().enumerate() {
            let location = format!("{} event {}", module, index);
            let descriptor = parse_definition(&location, definition, config)?;

            if let Some(previous) = self.events.insert(descriptor.id, descriptor) {
                tracing::warn!(
                    event_id = previous.id,
                    replaced = %previous.name,
                    "Duplicate event id in descriptor, keeping the later definition"
                );
            }
        }
        Ok(())
    }

    /// Descriptor for `id`, if the descriptor defined it
    pub fn lookup(&self, id: u32) -> Option<&EventDescriptor> {
        self.events.get(&id)
    }

    /// Whether `id` is known and enabled
    pub fn is_enabled(&self, id: u32) -> bool {
        self.lookup(id).is_some_and(|d| d.enabled)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Descriptors in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.events.values()
    }
}

fn parse_definition(
    location: &str,
    definition: &Value,
    config: &AuditConfig,
) -> Result<EventDescriptor, SchemaError> {
    let fields = match definition {
        Value::Object(fields) => fields,
        other => {
            return Err(SchemaError::UnexpectedKind {
                location: location.to_string(),
                found: kind_name(other),
            })
        }
    };
    if fields.is_empty() {
        return Err(SchemaError::MissingData {
            location: location.to_string(),
        });
    }
    if !fields.contains_key("id") {
        return Err(SchemaError::MissingId {
            location: location.to_string(),
        });
    }

    let parsed = EventDefinition::deserialize(definition).map_err(|e| {
        SchemaError::InvalidDefinition {
            location: location.to_string(),
            reason: e.to_string(),
        }
    })?;
    if parsed.id == 0 {
        return Err(SchemaError::ZeroId {
            location: location.to_string(),
        });
    }

    Ok(EventDescriptor {
        id: parsed.id,
        name: parsed.name,
        description: parsed.description,
        sync: config.is_sync(parsed.id),
        enabled: config.is_enabled(parsed.id),
        mandatory_fields: parsed.mandatory_fields.into_names(),
        optional_fields: parsed.optional_fields.into_names(),
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_enabling(enabled: &[u32], sync: &[u32]) -> AuditConfig {
        AuditConfig {
            enabled_ids: enabled.iter().copied().collect(),
            sync_ids: sync.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_lookup_auth_success() {
        let registry = EventRegistry::load(
            r#"[[{"id":4096,"name":"auth success","description":"d"}]]"#,
            &config_enabling(&[4096], &[]),
        )
        .unwrap();

        let descriptor = registry.lookup(4096).unwrap();
        assert_eq!(descriptor.name, "auth success");
        assert_eq!(descriptor.description, "d");
        assert!(descriptor.enabled);
        assert!(!descriptor.sync);
        assert!(registry.lookup(4097).is_none());
    }

    #[test]
    fn test_flags_come_from_config_not_descriptor() {
        let registry = EventRegistry::load(
            r#"[[{"id":4096,"name":"a","description":"b","enabled":false,"sync":false}]]"#,
            &config_enabling(&[4096], &[4096]),
        )
        .unwrap();
        let descriptor = registry.lookup(4096).unwrap();
        assert!(descriptor.enabled);
        assert!(descriptor.sync);
    }

    #[test]
    fn test_versioned_document_with_module_objects() {
        let descriptor = r#"{
            "version": 1,
            "modules": [
                {
                    "module": "auditd",
                    "startid": 4096,
                    "events": [
                        {"id": 4096, "name": "configured audit daemon", "description": "x",
                         "sync": true, "enabled": true,
                         "mandatory_fields": {"timestamp": "", "real_userid": {}},
                         "optional_fields": ["hostname"]},
                        {"id": 4097, "name": "shutting down audit daemon", "description": "y"}
                    ]
                }
            ]
        }"#;
        let registry = EventRegistry::load(descriptor, &config_enabling(&[4097], &[])).unwrap();
        assert_eq!(registry.len(), 2);

        let configured = registry.lookup(4096).unwrap();
        assert!(!configured.enabled);
        assert_eq!(configured.mandatory_fields, vec!["timestamp", "real_userid"]);
        assert_eq!(configured.optional_fields, vec!["hostname"]);
        assert!(registry.is_enabled(4097));
    }

    #[test]
    fn test_unknown_field_is_fatal() {
        let err = EventRegistry::load(
            r#"[[{"id":1,"name":"a","description":"b"},{"id":2,"name":"c","description":"d","colour":"red"}]]"#,
            &AuditConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonKey);
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_wrong_kind_for_known_field_is_fatal() {
        let err = EventRegistry::load(
            r#"[[{"id":"4096","name":"a","description":"b"}]]"#,
            &AuditConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonKey);
    }

    #[test]
    fn test_null_flag_placeholder_is_fatal() {
        for definition in [
            r#"[[{"id":4096,"name":"a","description":"b","sync":null}]]"#,
            r#"[[{"id":4096,"name":"a","description":"b","enabled":null}]]"#,
        ] {
            let err = EventRegistry::load(definition, &AuditConfig::default()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::JsonKey);
        }

        let registry = EventRegistry::load(
            r#"[[{"id":4096,"name":"a","description":"b","sync":true,"enabled":false}]]"#,
            &AuditConfig::default(),
        )
        .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_or_zero_id() {
        let err = EventRegistry::load(
            r#"[[{"name":"a","description":"b"}]]"#,
            &AuditConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MissingId { .. }));

        let err = EventRegistry::load(
            r#"[[{"id":0,"name":"a","description":"b"}]]"#,
            &AuditConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonId);
    }

    #[test]
    fn test_structural_errors() {
        let config = AuditConfig::default();

        let err = EventRegistry::load("not json", &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonParsing);

        let err = EventRegistry::load(r#"[{"module":"x","nested":{}}]"#, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonUnknownField);

        let err = EventRegistry::load(r#"[{}]"#, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonMissingData);

        let err = EventRegistry::load(r#"[[42]]"#, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonUnknownField);

        let err = EventRegistry::load(r#""just a string""#, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonUnknownField);
    }

    #[test]
    fn test_duplicate_id_last_wins() {
        let registry = EventRegistry::load(
            r#"[[{"id":7,"name":"first","description":"a"}],[{"id":7,"name":"second","description":"b"}]]"#,
            &AuditConfig::default(),
        )
        .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(7).unwrap().name, "second");
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_events.json");
        std::fs::write(&path, r#"[[{"id":4096,"name":"a","description":"b"}]]"#).unwrap();

        let registry = EventRegistry::load_file(&path, &config_enabling(&[4096], &[])).unwrap();
        assert!(registry.is_enabled(4096));

        let err = EventRegistry::load_file(dir.path().join("missing.json"), &AuditConfig::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileOpen);

        let from_path = ModuleDescriptor::from(path).build(&AuditConfig::default()).unwrap();
        assert!(!from_path.is_enabled(4096));
    }
}
