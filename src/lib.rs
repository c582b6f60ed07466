//! keyspace-forward - Redis Change Capture
//!
//! Subscribes to Redis keyspace notifications, reads the current value of
//! each changed key, and emits normalized change events on an async stream.
//! Failures for individual notifications go to a separate error stream and
//! never stop the pipeline.
//!
//! # Architecture
//!
//! - **Store**: Read access to the captured store ([`store`])
//! - **Pipeline**: Subscription, parsing, dispatch and the worker pool ([`pipeline`])
//! - **Events**: Change event model and wire codec ([`event`])
//! - **Sink**: Downstream delivery ([`sink`])
//! - **Config**: YAML configuration ([`config`])
//!
//! # Example
//!
//! ```rust,no_run
//! use keyspace_forward::config::AppConfig;
//! use keyspace_forward::pipeline;
//! use keyspace_forward::sink::{StdoutSink, forward};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let handles = pipeline::start(&config.redis, &config.pipeline).await?;
//!
//! let shutdown = handles.shutdown.clone();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     shutdown.shutdown().await;
//! });
//!
//! forward(handles.events, handles.errors, &StdoutSink::stdout()).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod event;
pub mod pipeline;
pub mod sink;
pub mod store;

pub use event::{ChangeEvent, EventType};
pub use pipeline::{PipelineBuilder, PipelineError, PipelineHandles, ShutdownHandle};
pub use sink::{ForwardStats, Sink, SinkError, StdoutSink};
pub use store::{MemoryStore, RedisStore, Store, StoreError};
