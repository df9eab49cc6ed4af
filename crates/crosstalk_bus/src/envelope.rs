//! # Envelopes
//!
//! Two shapes travel through the system:
//!
//! - [`Envelope`] is the wire contract between peers: `{"event": ..., "payload": ...}`.
//!   Any two buses on the same channel must agree on exactly this shape.
//! - [`ListenerEvent`] is what a listener receives from the registry:
//!   `{"event": ..., "data": ...}`. When dispatch comes from the bus, `data`
//!   is the whole inbound wire message, not just its `payload` field.

use compact_str::CompactString;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::ListenerError;

/// The message exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name used for routing on the receiving side
    pub event: String,
    /// Arbitrary structured payload
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Converts the envelope into the structured value posted on the transport.
    pub fn into_message(self) -> Value {
        serde_json::json!({
            "event": self.event,
            "payload": self.payload,
        })
    }

    /// Reads the event name out of an inbound message.
    ///
    /// Returns `None` for anything that is not an object with a string `event` field.
    pub fn event_name(message: &Value) -> Option<&str> {
        message.get("event").and_then(Value::as_str)
    }
}

/// The value handed to every listener on emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerEvent {
    /// Name the event was emitted under
    pub event: CompactString,
    /// Payload passed to `emit`
    pub data: Value,
}

impl ListenerEvent {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: CompactString::new(event),
            data,
        }
    }

    /// Deserializes `data` into a concrete type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ListenerError> {
        Ok(T::deserialize(&self.data)?)
    }

    /// Returns the `payload` field of `data` when the event came off the wire.
    pub fn wire_payload(&self) -> Option<&Value> {
        self.data.get("payload")
    }
}
