//! Pipeline builder and lifecycle.
//!
//! [`PipelineBuilder::build`] wires a store and a notification source into a
//! running pipeline and returns [`PipelineHandles`]: the two output streams
//! plus a [`ShutdownHandle`]. A supervisor task owns the source, the store
//! and the worker pool, and is the only place either resource is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, RedisConfig};
use crate::event::ChangeEvent;
use crate::pipeline::PipelineError;
use crate::pipeline::dispatch::Fetcher;
use crate::pipeline::emitter::{Intake, Outputs, spawn_workers};
use crate::pipeline::notification::{Notification, NotificationParser};
use crate::pipeline::subscriber::{NotificationSource, Subscriber};
use crate::store::Store;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 16;

/// Default intake queue capacity.
pub const DEFAULT_INTAKE_CAPACITY: usize = 1024;

/// Default capacity of each output stream.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 16;

/// Default timeout for a single store read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time in-flight work gets to finish on shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for a notification pipeline.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    keyspace_id: u32,
    workers: usize,
    intake_capacity: usize,
    output_capacity: usize,
    read_timeout: Duration,
    drain_timeout: Duration,
}

impl PipelineBuilder {
    /// Create a builder for notifications from the given keyspace.
    pub fn new(keyspace_id: u32) -> Self {
        Self {
            keyspace_id,
            workers: DEFAULT_WORKERS,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Create a builder from loaded configuration.
    pub fn from_config(redis: &RedisConfig, pipeline: &PipelineConfig) -> Self {
        Self::new(redis.keyspace_id)
            .workers(pipeline.workers)
            .intake_capacity(pipeline.intake_capacity)
            .output_capacity(pipeline.output_capacity)
            .read_timeout(pipeline.read_timeout)
            .drain_timeout(pipeline.drain_timeout)
    }

    /// Set the number of concurrent workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the intake queue capacity.
    ///
    /// When the queue is full the receive loop stops pulling notifications.
    pub fn intake_capacity(mut self, capacity: usize) -> Self {
        self.intake_capacity = capacity;
        self
    }

    /// Set the capacity of the events and errors streams.
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }

    /// Set the timeout for a single store read.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set how long in-flight work may run after shutdown is requested.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be positive".to_string()));
        }
        if self.intake_capacity == 0 {
            return Err(PipelineError::Config(
                "intake_capacity must be positive".to_string(),
            ));
        }
        if self.output_capacity == 0 {
            return Err(PipelineError::Config(
                "output_capacity must be positive".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(PipelineError::Config(
                "read_timeout must be positive".to_string(),
            ));
        }
        if self.drain_timeout.is_zero() {
            return Err(PipelineError::Config(
                "drain_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Start the pipeline over a store and a notification source.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build<S, N>(self, store: S, source: N) -> Result<PipelineHandles, PipelineError>
    where
        S: Store,
        N: NotificationSource,
    {
        self.validate()?;

        let store = Arc::new(store);
        let fetcher = Arc::new(Fetcher::new(Arc::clone(&store)));
        let cancel = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        let (events_tx, events) = mpsc::channel(self.output_capacity);
        let (errors_tx, errors) = mpsc::channel(self.output_capacity);
        let outputs = Outputs {
            events: events_tx,
            errors: errors_tx,
        };

        let (intake_tx, intake_rx) = mpsc::channel(self.intake_capacity);
        let intake: Intake = Arc::new(Mutex::new(intake_rx));
        let workers = spawn_workers(
            self.workers,
            fetcher,
            Arc::clone(&intake),
            outputs.clone(),
            self.read_timeout,
            cancel.clone(),
        );

        let supervisor = Supervisor {
            source,
            store,
            parser: NotificationParser::new(self.keyspace_id),
            intake_tx: Some(intake_tx),
            intake,
            workers,
            outputs,
            cancel: cancel.clone(),
            drain_timeout: self.drain_timeout,
            closed: Arc::clone(&closed),
        };

        tracing::info!(
            keyspace_id = self.keyspace_id,
            workers = self.workers,
            intake_capacity = self.intake_capacity,
            output_capacity = self.output_capacity,
            "Pipeline started"
        );
        let handle = tokio::spawn(supervisor.run());

        Ok(PipelineHandles {
            events,
            errors,
            shutdown: ShutdownHandle {
                cancel,
                supervisor: Arc::new(Mutex::new(Some(handle))),
                closed,
            },
        })
    }
}

/// Connect to Redis and start a pipeline with the given configuration.
///
/// # Errors
/// Returns the startup error kinds of [`PipelineError`]; nothing is retried.
pub async fn start(
    redis: &RedisConfig,
    pipeline: &PipelineConfig,
) -> Result<PipelineHandles, PipelineError> {
    let builder = PipelineBuilder::from_config(redis, pipeline);
    builder.validate()?;
    let (store, subscription) = Subscriber::connect(redis).await?;
    builder.build(store, subscription)
}

/// Handles to a running pipeline.
///
/// Both streams must be drained; an undrained stream eventually stalls the
/// workers writing to it. Dropping the handles does not stop the pipeline.
#[derive(Debug)]
pub struct PipelineHandles {
    /// Reconstructed change events, in completion order.
    pub events: mpsc::Receiver<ChangeEvent>,
    /// Per-notification failures.
    pub errors: mpsc::Receiver<PipelineError>,
    /// Shutdown control.
    pub shutdown: ShutdownHandle,
}

/// Idempotent shutdown control for a pipeline.
///
/// Cloneable; any clone may shut the pipeline down, any number of times.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    cancel: CancellationToken,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Stop the pipeline and wait until every resource is released.
    ///
    /// The first call stops intake, lets in-flight reads finish (up to the
    /// drain timeout), closes the subscription and the store connection,
    /// then closes both output streams. Later calls wait for that to finish
    /// and return.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for the pipeline to stop on its own, e.g. when the
    /// notification source ends.
    pub async fn wait(&self) {
        self.join().await;
    }

    /// Whether the pipeline has released its resources.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn join(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(handle) = supervisor.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Pipeline supervisor failed");
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

/// Owner of the source, the store and the worker pool.
struct Supervisor<S: Store, N: NotificationSource> {
    source: N,
    store: Arc<S>,
    parser: NotificationParser,
    intake_tx: Option<mpsc::Sender<Notification>>,
    intake: Intake,
    workers: JoinSet<()>,
    outputs: Outputs,
    cancel: CancellationToken,
    drain_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl<S: Store, N: NotificationSource> Supervisor<S, N> {
    async fn run(mut self) {
        let received = self.receive().await;
        tracing::info!(received, "Notification intake stopped");

        if let Err(e) = self.source.close().await {
            tracing::warn!(error = %e, "Failed to close subscription");
        }
        // Closing the intake lets workers drain what is queued when the source ended.
        self.intake_tx = None;

        self.drain_workers().await;

        let discarded = {
            let mut rx = self.intake.lock().await;
            rx.close();
            let mut n = 0usize;
            while rx.try_recv().is_ok() {
                n += 1;
            }
            n
        };
        if discarded > 0 {
            tracing::warn!(discarded, "Queued notifications discarded on shutdown");
        }

        if let Err(e) = self.store.close().await {
            tracing::warn!(error = %e, "Failed to close store connection");
        }

        // Last output senders go away here; consumers see end of stream.
        drop(self.outputs);
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("Pipeline stopped");
    }

    /// Pull notifications until cancelled or the source ends.
    async fn receive(&mut self) -> u64 {
        let mut received = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.source.next() => next,
            };

            let raw = match next {
                None => {
                    tracing::info!("Notification stream ended");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Unreadable notification");
                    self.outputs.report(PipelineError::Subscription(e));
                    continue;
                }
                Some(Ok(raw)) => raw,
            };
            received += 1;

            let Some(notification) = self.parser.parse(&raw) else {
                tracing::warn!(channel = %raw.channel, "Notification outside subscribed keyspace");
                let err = PipelineError::MalformedNotification {
                    channel: raw.channel,
                };
                self.outputs.report(err);
                continue;
            };

            let Some(intake_tx) = self.intake_tx.as_ref() else {
                break;
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = intake_tx.send(notification) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        received
    }

    async fn drain_workers(&mut self) {
        let workers = &mut self.workers;
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(res) = workers.join_next().await {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Worker failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                in_flight = self.workers.len(),
                timeout = ?self.drain_timeout,
                "Drain timed out, aborting workers"
            );
            self.workers.shutdown().await;
        }
    }
}
