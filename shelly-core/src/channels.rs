// ABOUTME: Items carried by the inbound, outbound and work channels.
// ABOUTME: Each channel has a Sentinel variant that stops its consumer immediately.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Raw item received from the space
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Sentinel,
    /// Serialized JSON payload
    Text(String),
    Payload(Value),
}

impl From<Value> for Inbound {
    fn from(value: Value) -> Self {
        Inbound::Payload(value)
    }
}

/// Structured reply for the speaker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_markdown(mut self, markdown: impl Into<String>) -> Self {
        self.markdown = Some(markdown.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn to_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::text(text)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::text(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Sentinel,
    Reply(Reply),
}

/// Queued execution of a non-interactive command
#[derive(Debug, Clone, PartialEq)]
pub enum Work {
    Sentinel,
    Task {
        room_id: String,
        verb: String,
        arguments: String,
    },
}

pub type InboundSender = mpsc::Sender<Inbound>;
pub type InboundReceiver = mpsc::Receiver<Inbound>;
pub type OutboundSender = mpsc::Sender<Outbound>;
pub type OutboundReceiver = mpsc::Receiver<Outbound>;
pub type WorkSender = mpsc::Sender<Work>;
pub type WorkReceiver = mpsc::Receiver<Work>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_builders() {
        let reply = Reply::text("hello")
            .with_markdown("**hello**")
            .with_file("report.pdf")
            .to_room("room-1");
        assert_eq!(reply.text, "hello");
        assert_eq!(reply.markdown.as_deref(), Some("**hello**"));
        assert_eq!(reply.file.as_deref(), Some("report.pdf"));
        assert_eq!(reply.room_id.as_deref(), Some("room-1"));
        assert_eq!(Reply::from("plain"), Reply::text("plain"));
    }
}
