//! Store Layer
//!
//! Read-only access to the keyed store whose changes are being captured.
//! The pipeline only ever reads through the [`Store`] trait, so the same
//! readers run against a live Redis server or an in-memory keyspace.
//!
//! # Components
//!
//! - [`Store`]: Async read capability shared by all readers
//! - [`RedisStore`]: Multiplexed Redis connection, safe for concurrent use
//! - [`MemoryStore`]: Typed in-memory keyspace for tests and demos
//! - [`StoreError`]: Failure of a single store call

mod error;
mod memory;
mod redis_store;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, normalize_addr};
pub use traits::Store;
