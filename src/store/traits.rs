//! Core store trait.

use std::collections::BTreeMap;

use crate::store::StoreError;

/// Read capability over the captured store.
///
/// One method per data type, each returning the key's full current value.
/// Implementations must be safe to call concurrently from many workers; the
/// pipeline shares a single instance behind an `Arc`.
///
/// Missing keys follow store semantics: composite reads return an empty
/// collection, while [`Store::get`] returns `Ok(None)`.
///
/// Composite members are binary-safe in the store. Implementations decode
/// them lossily, so invalid UTF-8 becomes U+FFFD instead of a read error.
/// String values from [`Store::get`] stay raw bytes.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Full string value (`GET`).
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All fields and values of a hash (`HGETALL`).
    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// All members of a set (`SMEMBERS`), in no particular order.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// All members of a sorted set in ascending score order (`ZRANGE key 0 -1`).
    async fn zrange_all(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// All elements of a list, head to tail (`LRANGE key 0 -1`).
    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Release the underlying connection.
    ///
    /// Reads issued after `close` fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}
