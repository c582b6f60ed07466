//! Structured encoding of composite values.
//!
//! Strings travel as raw bytes. Hashes encode as a JSON object and the
//! member-list types (set, sorted set, list) as a JSON array of strings.

use std::collections::BTreeMap;

use crate::event::{ChangeEvent, DecodeError, EventType};

/// Encode a hash as a JSON object with sorted fields.
pub fn encode_hash(fields: &BTreeMap<String, String>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(fields)
}

/// Encode set, sorted-set or list members as a JSON array.
pub fn encode_members(members: &[String]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(members)
}

/// Typed view over a change event's data.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Raw string value.
    String(Vec<u8>),
    /// Hash fields.
    Hash(BTreeMap<String, String>),
    /// Set members.
    Set(Vec<String>),
    /// Sorted-set members in score order.
    SortedSet(Vec<String>),
    /// List elements, head to tail.
    List(Vec<String>),
    /// Synthetic event without data.
    Empty,
}

impl EventData {
    /// Decode an event's data according to its type tag.
    ///
    /// # Errors
    /// Returns `DecodeError::Json` if a composite payload is not the expected
    /// JSON shape, and `DecodeError::UnexpectedData` if a synthetic event
    /// carries bytes.
    pub fn decode(event: &ChangeEvent) -> Result<Self, DecodeError> {
        let data = &event.data;
        Ok(match event.event_type {
            EventType::String => Self::String(data.clone()),
            EventType::Hash => Self::Hash(serde_json::from_slice(data)?),
            EventType::Set => Self::Set(serde_json::from_slice(data)?),
            EventType::SortedSet => Self::SortedSet(serde_json::from_slice(data)?),
            EventType::List => Self::List(serde_json::from_slice(data)?),
            ty @ (EventType::Delete | EventType::Expire | EventType::Rename) => {
                if !data.is_empty() {
                    return Err(DecodeError::UnexpectedData(ty));
                }
                Self::Empty
            }
        })
    }
}
