//! Event Sinks
//!
//! Downstream delivery for change events. A [`Sink`] receives each event
//! from the pipeline's events stream; [`forward`] drives a sink from both
//! output streams until the pipeline shuts down.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

use crate::event::{ChangeEvent, encode_event};
use crate::pipeline::PipelineError;

/// Sink delivery failure.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// Underlying writer failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for change events.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one event.
    async fn send(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

/// Writes one JSON-encoded [`WireEvent`](crate::event::WireEvent) per line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Sink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        let mut line = encode_event(event)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// JSON lines on standard output.
pub type StdoutSink = JsonLinesSink<tokio::io::Stdout>;

impl StdoutSink {
    /// Sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

/// Counters returned by [`forward`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Events the sink accepted.
    pub forwarded: u64,
    /// Events the sink rejected.
    pub failed: u64,
    /// Errors received from the pipeline.
    pub errors: u64,
}

/// Drain both output streams into `sink` until both are closed.
///
/// Pipeline errors and sink failures are logged and counted; neither stops
/// forwarding.
pub async fn forward<K: Sink + ?Sized>(
    mut events: mpsc::Receiver<ChangeEvent>,
    mut errors: mpsc::Receiver<PipelineError>,
    sink: &K,
) -> ForwardStats {
    let mut stats = ForwardStats::default();
    let mut events_open = true;
    let mut errors_open = true;

    while events_open || errors_open {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => match sink.send(&event).await {
                    Ok(()) => stats.forwarded += 1,
                    Err(e) => {
                        stats.failed += 1;
                        tracing::warn!(key = %event.key, op = %event.op, error = %e, "Sink rejected event");
                    }
                },
                None => events_open = false,
            },
            err = errors.recv(), if errors_open => match err {
                Some(err) => {
                    stats.errors += 1;
                    tracing::warn!(
                        key = err.key().unwrap_or_default(),
                        op = err.op().unwrap_or_default(),
                        error = %err,
                        "Pipeline error"
                    );
                }
                None => errors_open = false,
            },
        }
    }

    tracing::info!(
        forwarded = stats.forwarded,
        failed = stats.failed,
        errors = stats.errors,
        "Forwarding finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, decode_event};

    /// Collects events in memory, optionally failing on one key.
    #[derive(Default)]
    struct CollectingSink {
        events: std::sync::Mutex<Vec<ChangeEvent>>,
        reject_key: Option<String>,
    }

    #[async_trait]
    impl Sink for CollectingSink {
        async fn send(&self, event: &ChangeEvent) -> Result<(), SinkError> {
            if self.reject_key.as_deref() == Some(event.key.as_str()) {
                return Err(SinkError::Io(std::io::Error::other("rejected")));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_wire_events() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.send(&ChangeEvent::new("counter", EventType::String, "incr", b"6".to_vec()))
            .await
            .unwrap();
        sink.send(&ChangeEvent::synthetic("gone", EventType::Delete, "del"))
            .await
            .unwrap();

        let out = sink.into_inner();
        let lines: Vec<&[u8]> = out.split(|b| *b == b'\n').filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);

        let first = decode_event(lines[0]).unwrap();
        assert_eq!(first.key, "counter");
        assert_eq!(first.data, b"6");
        let second = decode_event(lines[1]).unwrap();
        assert_eq!(second.event_type, EventType::Delete);
        assert!(second.data.is_empty());
    }

    #[tokio::test]
    async fn test_forward_counts_until_both_streams_close() {
        let (events_tx, events_rx) = mpsc::channel(4);
        let (errors_tx, errors_rx) = mpsc::channel(4);
        let sink = CollectingSink {
            reject_key: Some("bad".to_string()),
            ..Default::default()
        };

        events_tx
            .send(ChangeEvent::new("a", EventType::String, "set", b"1".to_vec()))
            .await
            .unwrap();
        events_tx
            .send(ChangeEvent::new("bad", EventType::String, "set", b"2".to_vec()))
            .await
            .unwrap();
        errors_tx
            .send(PipelineError::UnsupportedOperation {
                key: "a".to_string(),
                op: "xadd".to_string(),
            })
            .await
            .unwrap();
        drop(events_tx);
        drop(errors_tx);

        let stats = forward(events_rx, errors_rx, &sink).await;
        assert_eq!(
            stats,
            ForwardStats {
                forwarded: 1,
                failed: 1,
                errors: 1
            }
        );
        assert_eq!(sink.events.lock().unwrap()[0].key, "a");
    }

    #[tokio::test]
    async fn test_forward_keeps_draining_after_one_stream_closes() {
        let (events_tx, events_rx) = mpsc::channel(1);
        let (errors_tx, errors_rx) = mpsc::channel::<PipelineError>(1);
        drop(errors_tx);

        let sink = CollectingSink::default();
        let producer = tokio::spawn(async move {
            for i in 0..5 {
                events_tx
                    .send(ChangeEvent::new(format!("k{i}"), EventType::String, "set", b"v".to_vec()))
                    .await
                    .unwrap();
            }
        });

        let stats = forward(events_rx, errors_rx, &sink).await;
        producer.await.unwrap();
        assert_eq!(stats.forwarded, 5);
        assert_eq!(stats.errors, 0);
    }
}
