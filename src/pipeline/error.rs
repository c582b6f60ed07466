//! Pipeline error types.
//!
//! Startup failures are returned from [`crate::pipeline::start`]; every other
//! variant is reported per notification on the pipeline's error stream.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Errors produced by the notification pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Could not connect to, or ping, the store.
    #[error("failed to connect to store at {addr}: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying failure.
        #[source]
        source: StoreError,
    },

    /// The store refused to enable keyspace notifications.
    #[error("unable to turn notifications on the server: {0}")]
    EnableNotifications(#[source] StoreError),

    /// Opening the pattern subscription failed.
    #[error("failed to subscribe to '{pattern}': {source}")]
    Subscribe {
        /// Channel pattern.
        pattern: String,
        /// Underlying failure.
        #[source]
        source: StoreError,
    },

    /// Invalid pipeline settings.
    #[error("invalid pipeline config: {0}")]
    Config(String),

    /// No reader is registered for the notification's verb.
    #[error("could not find a reader for operation '{op}' on key '{key}'")]
    UnsupportedOperation {
        /// Key from the notification.
        key: String,
        /// Unrecognized verb.
        op: String,
    },

    /// The store read for a key failed.
    #[error("failed to fetch key '{key}' after '{op}': {source}")]
    Read {
        /// Key being read.
        key: String,
        /// Verb that triggered the read.
        op: String,
        /// Underlying failure.
        #[source]
        source: StoreError,
    },

    /// The read did not complete in time.
    #[error("fetch of key '{key}' after '{op}' timed out after {timeout:?}")]
    Timeout {
        /// Key being read.
        key: String,
        /// Verb that triggered the read.
        op: String,
        /// Configured read timeout.
        timeout: Duration,
    },

    /// Encoding a composite value failed.
    #[error("failed to encode value of key '{key}' after '{op}': {source}")]
    Encode {
        /// Key being encoded.
        key: String,
        /// Verb that triggered the read.
        op: String,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },

    /// A notification arrived on a channel outside the subscribed keyspace.
    #[error("malformed notification on channel '{channel}'")]
    MalformedNotification {
        /// Raw channel name.
        channel: String,
    },

    /// The notification stream yielded an unreadable message.
    #[error("notification stream error: {0}")]
    Subscription(#[source] StoreError),
}

impl PipelineError {
    /// Key the failure relates to, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnsupportedOperation { key, .. }
            | Self::Read { key, .. }
            | Self::Timeout { key, .. }
            | Self::Encode { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Verb the failure relates to, when there is one.
    pub fn op(&self) -> Option<&str> {
        match self {
            Self::UnsupportedOperation { op, .. }
            | Self::Read { op, .. }
            | Self::Timeout { op, .. }
            | Self::Encode { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Whether this error can only occur while starting the pipeline.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::EnableNotifications(_)
                | Self::Subscribe { .. }
                | Self::Config(_)
        )
    }
}
