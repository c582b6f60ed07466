//! Core event types.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Semantic tag of a change event.
///
/// Value-bearing tags name the store data type that was read; the remaining
/// tags mark synthetic events that carry no data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventType {
    /// Plain string value.
    String,
    /// Hash of field/value pairs.
    Hash,
    /// Unordered set of members.
    Set,
    /// Members ordered by score.
    SortedSet,
    /// Ordered list of elements.
    List,
    /// Key was deleted.
    Delete,
    /// Key had a TTL set, or expired.
    Expire,
    /// Key was renamed (source or destination side).
    Rename,
}

impl EventType {
    /// All tags, value-bearing first.
    pub const ALL: [EventType; 8] = [
        Self::String,
        Self::Hash,
        Self::Set,
        Self::SortedSet,
        Self::List,
        Self::Delete,
        Self::Expire,
        Self::Rename,
    ];

    /// Whether events of this type are produced without a store read.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Delete | Self::Expire | Self::Rename)
    }
}

/// A key's reconstructed value after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Logical key, without the keyspace channel prefix.
    pub key: String,
    /// Semantic tag.
    pub event_type: EventType,
    /// Verb of the notification that produced this event (e.g. `hset`).
    pub op: String,
    /// Encoded value; empty for synthetic events.
    pub data: Vec<u8>,
}

impl ChangeEvent {
    /// Create a value-bearing event.
    pub fn new(
        key: impl Into<String>,
        event_type: EventType,
        op: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            key: key.into(),
            event_type,
            op: op.into(),
            data,
        }
    }

    /// Create a synthetic event with empty data.
    pub fn synthetic(key: impl Into<String>, event_type: EventType, op: impl Into<String>) -> Self {
        Self::new(key, event_type, op, Vec::new())
    }

    /// Data interpreted as UTF-8, if it is valid.
    pub fn data_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}): {}",
            self.event_type,
            self.key,
            self.op,
            String::from_utf8_lossy(&self.data)
        )
    }
}
