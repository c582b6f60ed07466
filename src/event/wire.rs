//! Wire envelope for forwarding change events.
//!
//! Events cross process boundaries as a JSON object whose `data` field is
//! base64, so binary string values survive intact:
//!
//! ```json
//! {"key":"user:1","type":"hash","op":"hset","data":"eyJuYW1lIjoiQWxpY2UifQ=="}
//! ```
//!
//! Decoding is strict: every field is required, the type tag must be known,
//! and synthetic types must carry empty data.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{ChangeEvent, EventType};

/// Errors from decoding a wire event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Malformed JSON, a missing field, or an unknown type tag.
    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),

    /// The `data` field is not valid base64.
    #[error("invalid event data encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A synthetic event type carried a payload.
    #[error("event of type '{0}' must not carry data")]
    UnexpectedData(EventType),
}

/// Serialized form of a [`ChangeEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireEvent {
    /// Logical key.
    pub key: String,
    /// Type tag.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Originating verb.
    pub op: String,
    /// Base64 of the event data.
    pub data: String,
}

impl From<&ChangeEvent> for WireEvent {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            key: event.key.clone(),
            event_type: event.event_type,
            op: event.op.clone(),
            data: STANDARD.encode(&event.data),
        }
    }
}

impl TryFrom<WireEvent> for ChangeEvent {
    type Error = DecodeError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let data = STANDARD.decode(wire.data.as_bytes())?;
        if wire.event_type.is_synthetic() && !data.is_empty() {
            return Err(DecodeError::UnexpectedData(wire.event_type));
        }
        Ok(ChangeEvent::new(wire.key, wire.event_type, wire.op, data))
    }
}

/// Serialize an event to its JSON wire form.
pub fn encode_event(event: &ChangeEvent) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&WireEvent::from(event))
}

/// Parse and validate an event from its JSON wire form.
pub fn decode_event(bytes: &[u8]) -> Result<ChangeEvent, DecodeError> {
    let wire: WireEvent = serde_json::from_slice(bytes)?;
    ChangeEvent::try_from(wire)
}
