//! Bounded worker pool.
//!
//! Workers pull parsed notifications from a shared intake queue, run the
//! fetch, and route the outcome to the events or errors output. A worker
//! blocked on a full output only stalls itself; the intake queue absorbs
//! bursts until it fills, at which point the receive loop waits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::event::ChangeEvent;
use crate::pipeline::PipelineError;
use crate::pipeline::dispatch::Fetcher;
use crate::pipeline::notification::Notification;
use crate::store::Store;

/// Shared receiving end of the intake queue.
pub(crate) type Intake = Arc<Mutex<mpsc::Receiver<Notification>>>;

/// Senders for the two output streams.
#[derive(Debug, Clone)]
pub(crate) struct Outputs {
    pub events: mpsc::Sender<ChangeEvent>,
    pub errors: mpsc::Sender<PipelineError>,
}

impl Outputs {
    /// Route a fetch outcome. Returns `false` once the consumer has gone away.
    pub async fn route(&self, outcome: Result<ChangeEvent, PipelineError>) -> bool {
        match outcome {
            Ok(event) => self.events.send(event).await.is_ok(),
            Err(err) => self.errors.send(err).await.is_ok(),
        }
    }

    /// Report an error from the receive loop without waiting.
    ///
    /// The error is dropped when the stream is full or has no consumer.
    /// Returns whether it was queued.
    pub fn report(&self, err: PipelineError) -> bool {
        match self.errors.try_send(err) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(err)) => {
                tracing::debug!(error = %err, "Error stream full, dropping error");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Error stream has no consumer, dropping error");
                false
            }
        }
    }
}

/// Spawn `workers` tasks draining `intake` into `outputs`.
pub(crate) fn spawn_workers<S: Store>(
    workers: usize,
    fetcher: Arc<Fetcher<S>>,
    intake: Intake,
    outputs: Outputs,
    read_timeout: Duration,
    cancel: CancellationToken,
) -> JoinSet<()> {
    let mut set = JoinSet::new();
    for id in 0..workers {
        set.spawn(run_worker(
            id,
            Arc::clone(&fetcher),
            Arc::clone(&intake),
            outputs.clone(),
            read_timeout,
            cancel.clone(),
        ));
    }
    set
}

async fn run_worker<S: Store>(
    id: usize,
    fetcher: Arc<Fetcher<S>>,
    intake: Intake,
    outputs: Outputs,
    read_timeout: Duration,
    cancel: CancellationToken,
) {
    tracing::trace!(worker = id, "Worker started");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            n = async { intake.lock().await.recv().await } => n,
        };
        let Some(notification) = next else {
            break;
        };

        let outcome = fetch_with_timeout(&fetcher, &notification, read_timeout).await;
        match &outcome {
            Ok(event) => {
                tracing::debug!(key = %event.key, op = %event.op, event_type = %event.event_type, "Reconstructed key");
            }
            Err(e) => {
                tracing::debug!(key = %notification.key, op = %notification.op, error = %e, "Fetch failed");
            }
        }

        if !outputs.route(outcome).await {
            tracing::debug!(worker = id, "Output stream closed by consumer");
        }
    }
    tracing::trace!(worker = id, "Worker stopped");
}

async fn fetch_with_timeout<S: Store>(
    fetcher: &Fetcher<S>,
    notification: &Notification,
    read_timeout: Duration,
) -> Result<ChangeEvent, PipelineError> {
    let Notification { op, key } = notification;
    match tokio::time::timeout(read_timeout, fetcher.fetch(op, key)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PipelineError::Timeout {
            key: key.clone(),
            op: op.clone(),
            timeout: read_timeout,
        }),
    }
}
