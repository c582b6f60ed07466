//! Keyspace notification parsing.
//!
//! Redis publishes `__keyspace@<db>__:<key>` with the command name as the
//! payload. Parsing strips the prefix to recover the key and keeps the
//! payload verbatim as the verb.

/// A notification exactly as received from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    /// Channel name, e.g. `__keyspace@0__:user:1`.
    pub channel: String,
    /// Payload, e.g. `hset`.
    pub payload: String,
}

impl RawNotification {
    /// Create a raw notification.
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// A parsed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Operation verb.
    pub op: String,
    /// Logical key.
    pub key: String,
}

/// Channel prefix for a keyspace, e.g. `__keyspace@0__:`.
pub fn keyspace_prefix(keyspace_id: u32) -> String {
    format!("__keyspace@{keyspace_id}__:")
}

/// Subscription pattern for a keyspace and key pattern.
///
/// ```
/// use keyspace_forward::pipeline::subscription_pattern;
///
/// assert_eq!(subscription_pattern(0, "user:*"), "__keyspace@0__:user:*");
/// ```
pub fn subscription_pattern(keyspace_id: u32, pattern: &str) -> String {
    format!("{}{}", keyspace_prefix(keyspace_id), pattern)
}

/// Parser bound to one keyspace.
#[derive(Debug, Clone)]
pub struct NotificationParser {
    prefix: String,
}

impl NotificationParser {
    /// Create a parser for the given keyspace.
    pub fn new(keyspace_id: u32) -> Self {
        Self {
            prefix: keyspace_prefix(keyspace_id),
        }
    }

    /// Split a raw notification into verb and key.
    ///
    /// Returns `None` if the channel does not belong to this keyspace.
    pub fn parse(&self, raw: &RawNotification) -> Option<Notification> {
        let key = raw.channel.strip_prefix(&self.prefix)?;
        Some(Notification {
            op: raw.payload.clone(),
            key: key.to_string(),
        })
    }
}
