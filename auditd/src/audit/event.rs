//! Audit event types
//!
//! [`Event`] is what producers hand to the queue; [`EventDescriptor`] is the
//! registry's view of one event type. [`PayloadFields`] is a parsed payload
//! whose values keep their original JSON text.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// A submitted event awaiting processing
///
/// The payload is copied at submission so the caller's buffer can be reused
/// as soon as `submit` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event type identifier
    pub id: u32,
    /// Raw JSON object text as supplied by the producer
    pub payload: String,
}

impl Event {
    /// Copy a producer payload into a new event
    ///
    /// Invalid UTF-8 is replaced rather than rejected here; the processor
    /// reports the payload as unparseable JSON if it no longer is.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        Self {
            id,
            payload: String::from_utf8_lossy(payload).into_owned(),
        }
    }
}

/// Registry entry for one event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub id: u32,
    pub name: String,
    pub description: String,
    /// Advisory: the sink flushes lines of this type immediately
    pub sync: bool,
    /// Submissions of this type are queued
    pub enabled: bool,
    /// Fields every payload of this type is expected to carry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mandatory_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_fields: Vec<String>,
}

impl EventDescriptor {
    /// Names from `mandatory_fields` absent from the given payload object
    pub fn missing_fields<'a>(&'a self, payload: &PayloadFields) -> Vec<&'a str> {
        self.mandatory_fields
            .iter()
            .filter(|field| !payload.contains_key(field.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Top-level members of a payload object, in their original order
///
/// Values are kept as the exact JSON text the producer sent, so numbers such
/// as `1.10` or `18446744073709551616` are written back unchanged. A repeated
/// key keeps its first position and its last value.
#[derive(Debug, Default)]
pub struct PayloadFields(Vec<(String, Box<RawValue>)>);

impl PayloadFields {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(name, _)| name == key)
    }

    /// Take a member out, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<Box<RawValue>> {
        let index = self.0.iter().position(|(name, _)| name == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    fn insert(&mut self, key: String, value: Box<RawValue>) {
        match self.0.iter_mut().find(|(name, _)| *name == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }
}

impl<'de> Deserialize<'de> for PayloadFields {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{MapAccess, Visitor};

        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = PayloadFields;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a JSON object")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut fields = PayloadFields::default();
                while let Some((key, value)) = map.next_entry::<String, Box<RawValue>>()? {
                    fields.insert(key, value);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_copies_payload() {
        let mut buf = br#"{"user":"bob"}"#.to_vec();
        let event = Event::new(4096, &buf);
        buf.clear();
        assert_eq!(event.id, 4096);
        assert_eq!(event.payload, r#"{"user":"bob"}"#);
    }

    #[test]
    fn test_event_lossy_utf8() {
        let event = Event::new(1, &[b'{', 0xff, b'}']);
        assert_eq!(event.payload, "{\u{fffd}}");
    }

    #[test]
    fn test_missing_fields() {
        let descriptor = EventDescriptor {
            id: 4096,
            name: "auth success".to_string(),
            description: "d".to_string(),
            sync: false,
            enabled: true,
            mandatory_fields: vec!["user".to_string(), "remote".to_string()],
            optional_fields: Vec::new(),
        };
        let payload: PayloadFields = serde_json::from_str(r#"{"user":"bob"}"#).unwrap();
        assert_eq!(descriptor.missing_fields(&payload), vec!["remote"]);
    }

    #[test]
    fn test_payload_fields_keep_value_text_and_order() {
        let mut fields: PayloadFields = serde_json::from_str(
            r#"{"big":18446744073709551616,"ratio":1.10,"user":"bob","nested":{"a":[1,2]}}"#,
        )
        .unwrap();
        assert_eq!(fields.len(), 4);

        let ratio = fields.remove("ratio").unwrap();
        assert_eq!(ratio.get(), "1.10");
        assert!(!fields.contains_key("ratio"));

        let rest: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k, v.get())).collect();
        assert_eq!(
            rest,
            vec![
                ("big", "18446744073709551616"),
                ("user", "\"bob\""),
                ("nested", r#"{"a":[1,2]}"#),
            ]
        );
    }

    #[test]
    fn test_payload_fields_repeated_key_last_value_wins() {
        let fields: PayloadFields =
            serde_json::from_str(r#"{"user":"alice","n":1,"user":"bob"}"#).unwrap();
        let rest: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k, v.get())).collect();
        assert_eq!(rest, vec![("user", "\"bob\""), ("n", "1")]);
    }

    #[test]
    fn test_payload_fields_reject_non_objects() {
        assert!(serde_json::from_str::<PayloadFields>("[1,2]").is_err());
        assert!(serde_json::from_str::<PayloadFields>("\"text\"").is_err());
    }
}
