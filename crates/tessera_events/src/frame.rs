//! Wire frame envelope shared by the transport and every consumer.
//!
//! Both directions of the persistent connection use the same JSON envelope:
//!
//! ```json
//! { "type": "chat_message", "data": { ... }, "timestamp": 1723000000000, "message_id": "m1" }
//! ```
//!
//! Frames are immutable once parsed; consumers read them through shared
//! references handed out by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single protocol frame.
///
/// `kind` is the routing key (serialized as `type` on the wire), `data` is an
/// arbitrary structured payload, and the two optional fields carry the
/// server's send timestamp and a deduplication id for chat-like frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    /// Frame type used for routing (the wire field is named `type`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Structured payload; defaults to JSON `null` when absent.
    #[serde(default)]
    pub data: Value,

    /// Milliseconds since the Unix epoch, stamped by the sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Unique id for frames whose delivery must be deduplicated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Frame {
    /// Creates a frame with the current timestamp and no message id.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Some(current_timestamp_ms()),
            message_id: None,
        }
    }

    /// Attaches a deduplication id to the frame.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Parses a frame from raw wire text.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serializes the frame to wire text.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Returns the current Unix timestamp in milliseconds.
///
/// All locally produced frames stamp their `timestamp` field through this
/// function so comparisons between frames are meaningful.
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_envelope_fields() {
        let frame = Frame::new("chat_message", json!({ "text": "hello" })).with_message_id("m1");
        let wire = frame.to_wire().unwrap();
        let parsed = Frame::parse(&wire).unwrap();

        assert_eq!(parsed.kind, "chat_message");
        assert_eq!(parsed.data["text"], "hello");
        assert_eq!(parsed.message_id.as_deref(), Some("m1"));
        assert!(parsed.timestamp.is_some());
    }

    #[test]
    fn parses_minimal_envelope() {
        let parsed = Frame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(parsed.kind, "heartbeat");
        assert!(parsed.data.is_null());
        assert!(parsed.timestamp.is_none());
        assert!(parsed.message_id.is_none());
    }

    #[test]
    fn rejects_envelope_without_type() {
        assert!(Frame::parse(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn wire_field_is_named_type() {
        let frame = Frame::new("pong", Value::Null);
        let wire = frame.to_wire().unwrap();
        assert!(wire.contains(r#""type":"pong""#));
        assert!(!wire.contains("kind"));
    }
}
