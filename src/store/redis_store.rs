//! Redis-backed store.
//!
//! Wraps a [`MultiplexedConnection`], which pipelines concurrent commands over
//! one socket. Each call clones the connection handle, so readers never
//! serialize on a lock while a command is in flight.

use std::collections::BTreeMap;
use std::sync::Mutex;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::store::{Store, StoreError};

/// Keyspace notification flags: `K` (keyspace channel) + `A` (all command classes).
pub const KEYSPACE_EVENT_FLAGS: &str = "KA";

/// Turn a bare `host:port` address into a connection URL.
///
/// Addresses that already carry a scheme (`redis://`, `rediss://`,
/// `redis+unix://`, `unix://`) are returned unchanged.
///
/// ```
/// use keyspace_forward::store::normalize_addr;
///
/// assert_eq!(normalize_addr("127.0.0.1:6379"), "redis://127.0.0.1:6379");
/// assert_eq!(normalize_addr("rediss://cache:6380/0"), "rediss://cache:6380/0");
/// ```
pub fn normalize_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

/// Store implementation over a Redis multiplexed connection.
pub struct RedisStore {
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Open a multiplexed connection from a client.
    pub async fn connect(client: &redis::Client) -> Result<Self, StoreError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn))
    }

    /// Wrap an already established connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Verify connectivity with `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::debug!(reply = %pong, "Store ping succeeded");
        Ok(())
    }

    /// Enable keyspace notifications for every command class.
    pub async fn enable_keyspace_notifications(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(KEYSPACE_EVENT_FLAGS)
            .query_async(&mut conn)
            .await?;
        tracing::info!(flags = KEYSPACE_EVENT_FLAGS, "Keyspace notifications enabled");
        Ok(())
    }

    fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(StoreError::Closed)
    }
}

/// Decode binary-safe members, replacing invalid UTF-8 with U+FFFD.
fn lossy_members(raw: Vec<Vec<u8>>) -> Vec<String> {
    raw.into_iter()
        .map(|m| String::from_utf8_lossy(&m).into_owned())
        .collect()
}

/// Decode binary-safe hash fields and values, replacing invalid UTF-8 with U+FFFD.
fn lossy_fields(raw: Vec<(Vec<u8>, Vec<u8>)>) -> BTreeMap<String, String> {
    raw.into_iter()
        .map(|(f, v)| {
            (
                String::from_utf8_lossy(&f).into_owned(),
                String::from_utf8_lossy(&v).into_owned(),
            )
        })
        .collect()
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self
            .conn
            .lock()
            .map(|c| c.is_some())
            .unwrap_or(false);
        f.debug_struct("RedisStore")
            .field("open", &open)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection()?;
        Ok(conn.get(key).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut conn = self.connection()?;
        let fields: Vec<(Vec<u8>, Vec<u8>)> = conn.hgetall(key).await?;
        Ok(lossy_fields(fields))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        let members: Vec<Vec<u8>> = conn.smembers(key).await?;
        Ok(lossy_members(members))
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        let members: Vec<Vec<u8>> = conn.zrange(key, 0, -1).await?;
        Ok(lossy_members(members))
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        let elements: Vec<Vec<u8>> = conn.lrange(key, 0, -1).await?;
        Ok(lossy_members(elements))
    }

    async fn close(&self) -> Result<(), StoreError> {
        // Dropping the last handle closes the socket once in-flight commands complete.
        let released = self
            .conn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if released.is_some() {
            tracing::debug!("Store connection released");
        }
        Ok(())
    }
}
