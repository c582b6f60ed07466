//! Store-specific error types.

use thiserror::Error;

/// Errors returned by a single store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key no longer exists at read time.
    #[error("key not found")]
    KeyNotFound,

    /// The key holds a value of a different type than the one requested.
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// The connection has already been released.
    #[error("store connection is closed")]
    Closed,
}
