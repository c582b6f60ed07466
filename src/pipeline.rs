//! Notification Pipeline
//!
//! Turns keyspace notifications into change events:
//!
//! ```text
//! NotificationSource ──▶ NotificationParser ──▶ intake queue
//!                                                   │
//!                          ┌────────────────────────┘
//!                          ▼
//!                   worker pool (Fetcher: DispatchTable ▶ Reader ▶ Store)
//!                          │
//!                ┌─────────┴─────────┐
//!                ▼                   ▼
//!          events stream       errors stream
//! ```
//!
//! # Components
//!
//! - [`Subscriber`] / [`NotificationSource`]: Where raw notifications come from
//! - [`NotificationParser`]: Channel prefix stripping
//! - [`DispatchTable`] / [`Reader`] / [`Fetcher`]: Verb dispatch and value reads
//! - [`PipelineBuilder`] / [`PipelineHandles`] / [`ShutdownHandle`]: Wiring and lifecycle
//!
//! # Ordering
//!
//! Events are emitted in completion order. Two notifications for the same
//! key may be read concurrently, and each read observes the store as it is
//! at read time, so an event can carry a value newer than the mutation that
//! triggered it.

mod builder;
mod dispatch;
mod emitter;
mod error;
mod notification;
mod subscriber;

pub use builder::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_INTAKE_CAPACITY, DEFAULT_OUTPUT_CAPACITY, DEFAULT_READ_TIMEOUT,
    DEFAULT_WORKERS, PipelineBuilder, PipelineHandles, ShutdownHandle, start,
};
pub use dispatch::{DispatchTable, Fetcher, Reader};
pub use error::PipelineError;
pub use notification::{
    Notification, NotificationParser, RawNotification, keyspace_prefix, subscription_pattern,
};
pub use subscriber::{ChannelSource, NotificationSource, RedisSubscription, Subscriber, channel_source};
