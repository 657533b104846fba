// ABOUTME: Typed inbound events (message, attachment, join, leave, generic).
// ABOUTME: Classifies raw JSON payloads from the space into one Event record.

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// What happened in the space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Attachment,
    Join,
    Leave,
    #[serde(rename = "event")]
    Generic,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Attachment => "attachment",
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Generic => "event",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "message" => Some(EventKind::Message),
            "attachment" => Some(EventKind::Attachment),
            "join" => Some(EventKind::Join),
            "leave" => Some(EventKind::Leave),
            "event" | "inbound" => Some(EventKind::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound occurrence, built once from a raw payload.
///
/// Fields the model does not know about are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub id: String,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_label: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Classify and build an event from a raw JSON payload.
    ///
    /// An explicit `type` wins. Otherwise `url` means attachment,
    /// `text`/`files` means message, `actor_id` means join or leave
    /// (leave when `membership` is `"leave"`), and anything else carrying
    /// `id` and `room_id` is a generic event.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(BotError::MalformedPayload(
                "payload is not a mapping".to_string(),
            ));
        };

        normalize_identity(&mut map, "id");
        normalize_identity(&mut map, "room_id");
        if !map.contains_key("id") || !map.contains_key("room_id") {
            return Err(BotError::MalformedPayload(
                "payload needs both 'id' and 'room_id'".to_string(),
            ));
        }

        let kind = match map.get("type") {
            Some(Value::String(name)) => EventKind::parse(name).ok_or_else(|| {
                BotError::MalformedPayload(format!("unknown event type '{name}'"))
            })?,
            Some(other) => {
                return Err(BotError::MalformedPayload(format!(
                    "event type must be a string, got {other}"
                )))
            }
            None => classify(&map),
        };
        map.insert("type".to_string(), Value::String(kind.as_str().to_string()));

        serde_json::from_value(Value::Object(map))
            .map_err(|e| BotError::MalformedPayload(e.to_string()))
    }

    /// Parse serialized JSON, then classify it
    pub fn from_text(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BotError::MalformedPayload(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// A text message in `room_id`, mostly handy to drive a bot locally
    pub fn message(room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Message,
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            room_type: None,
            from_id: None,
            from_label: None,
            text: text.into(),
            markdown: None,
            files: Vec::new(),
            url: None,
            actor_id: None,
            actor_label: None,
            mentioned_ids: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.room_type.as_deref() == Some("direct")
    }

    /// Read one attribute the model does not name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Verify the kind before a handler touches kind-specific fields
    pub fn expect_kind(&self, expected: EventKind) -> Result<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(BotError::WrongEventKind {
                expected: expected.as_str(),
                actual: self.kind.as_str(),
            })
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} {}", self.kind, self.id),
        }
    }
}

fn classify(map: &Map<String, Value>) -> EventKind {
    if map.contains_key("url") {
        EventKind::Attachment
    } else if map.contains_key("text") || map.contains_key("files") {
        EventKind::Message
    } else if map.contains_key("actor_id") {
        match map.get("membership").and_then(Value::as_str) {
            Some("leave") => EventKind::Leave,
            _ => EventKind::Join,
        }
    } else {
        EventKind::Generic
    }
}

/// Spaces sometimes send numeric identifiers
fn normalize_identity(map: &mut Map<String, Value>, field: &str) {
    if let Some(Value::Number(n)) = map.get(field) {
        let text = n.to_string();
        map.insert(field.to_string(), Value::String(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_shapes() {
        let cases = [
            (json!({"id": "1", "room_id": "r", "text": "hi"}), EventKind::Message),
            (json!({"id": "1", "room_id": "r", "files": ["a.png"]}), EventKind::Message),
            (json!({"id": "1", "room_id": "r", "url": "http://x"}), EventKind::Attachment),
            (json!({"id": "1", "room_id": "r", "actor_id": "a"}), EventKind::Join),
            (
                json!({"id": "1", "room_id": "r", "actor_id": "a", "membership": "leave"}),
                EventKind::Leave,
            ),
            (json!({"id": "1", "room_id": "r", "colour": "red"}), EventKind::Generic),
        ];
        for (payload, kind) in cases {
            assert_eq!(Event::from_value(payload).unwrap().kind, kind);
        }
    }

    #[test]
    fn test_explicit_type_wins() {
        let event =
            Event::from_value(json!({"type": "leave", "id": "1", "room_id": "r", "text": "bye"}))
                .unwrap();
        assert_eq!(event.kind, EventKind::Leave);
        assert_eq!(event.text, "bye");
    }

    #[test]
    fn test_missing_identity_is_malformed() {
        let err = Event::from_value(json!({"text": "hi"})).unwrap_err();
        assert!(matches!(err, BotError::MalformedPayload(_)));

        let err = Event::from_value(json!(["not", "a", "mapping"])).unwrap_err();
        assert!(matches!(err, BotError::MalformedPayload(_)));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let err = Event::from_value(json!({"type": "dance", "id": "1", "room_id": "r"}))
            .unwrap_err();
        assert!(matches!(err, BotError::MalformedPayload(_)));
    }

    #[test]
    fn test_extra_attributes_are_kept() {
        let event =
            Event::from_value(json!({"id": 7, "room_id": "r", "colour": "red"})).unwrap();
        assert_eq!(event.id, "7");
        assert_eq!(event.attribute("colour"), Some(&json!("red")));
        assert_eq!(event.to_value()["type"], json!("event"));
    }

    #[test]
    fn test_expect_kind() {
        let event = Event::message("r", "hello");
        assert!(event.expect_kind(EventKind::Message).is_ok());
        let err = event.expect_kind(EventKind::Join).unwrap_err();
        assert!(matches!(
            err,
            BotError::WrongEventKind { expected: "join", actual: "message" }
        ));
    }
}
