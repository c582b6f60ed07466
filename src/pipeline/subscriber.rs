//! Notification sources.
//!
//! [`Subscriber::connect`] performs the startup handshake against Redis and
//! returns the connection plus a live [`RedisSubscription`]. Anything that
//! implements [`NotificationSource`] can feed the pipeline; [`ChannelSource`]
//! is the in-process variant used for embedding and tests.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::config::RedisConfig;
use crate::pipeline::notification::{RawNotification, subscription_pattern};
use crate::pipeline::PipelineError;
use crate::store::{RedisStore, StoreError, normalize_addr};

/// A lazy, unbounded sequence of raw notifications.
#[async_trait::async_trait]
pub trait NotificationSource: Send + 'static {
    /// Next notification, or `None` once the source is exhausted or closed.
    async fn next(&mut self) -> Option<Result<RawNotification, StoreError>>;

    /// Release the subscription. Later calls to `next` return `None`.
    async fn close(&mut self) -> Result<(), StoreError>;
}

type MessageStream = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

/// Pattern subscription on a dedicated Redis pub/sub connection.
pub struct RedisSubscription {
    pattern: String,
    messages: Option<MessageStream>,
}

impl RedisSubscription {
    /// Channel pattern this subscription listens on.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl std::fmt::Debug for RedisSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSubscription")
            .field("pattern", &self.pattern)
            .field("open", &self.messages.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl NotificationSource for RedisSubscription {
    async fn next(&mut self) -> Option<Result<RawNotification, StoreError>> {
        let msg = self.messages.as_mut()?.next().await?;
        let payload = match msg.get_payload::<String>() {
            Ok(payload) => payload,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(RawNotification::new(msg.get_channel_name(), payload)))
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        // Dropping the stream drops the pub/sub connection, which ends the subscription.
        if self.messages.take().is_some() {
            tracing::info!(pattern = %self.pattern, "Subscription closed");
        }
        Ok(())
    }
}

/// Startup handshake against a Redis server.
#[derive(Debug)]
pub struct Subscriber;

impl Subscriber {
    /// Connect, verify connectivity, enable keyspace notifications and
    /// subscribe to `__keyspace@{id}__:{pattern}`.
    ///
    /// # Errors
    /// `Connect`, `EnableNotifications` or `Subscribe`, depending on which
    /// step failed. Nothing is retried.
    pub async fn connect(
        config: &RedisConfig,
    ) -> Result<(RedisStore, RedisSubscription), PipelineError> {
        let url = normalize_addr(&config.addr);
        let connect_err = |source: StoreError| PipelineError::Connect {
            addr: config.addr.clone(),
            source,
        };

        let client = redis::Client::open(url.as_str()).map_err(|e| connect_err(e.into()))?;
        let store = RedisStore::connect(&client).await.map_err(connect_err)?;
        store.ping().await.map_err(connect_err)?;
        store
            .enable_keyspace_notifications()
            .await
            .map_err(PipelineError::EnableNotifications)?;

        let pattern = subscription_pattern(config.keyspace_id, &config.pattern);
        let subscribe_err = |source: StoreError| PipelineError::Subscribe {
            pattern: pattern.clone(),
            source,
        };
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| subscribe_err(e.into()))?;
        pubsub
            .psubscribe(pattern.as_str())
            .await
            .map_err(|e| subscribe_err(e.into()))?;

        tracing::info!(addr = %config.addr, pattern = %pattern, "Subscribed to keyspace notifications");

        let messages: MessageStream = Box::pin(pubsub.into_on_message());
        Ok((
            store,
            RedisSubscription {
                pattern,
                messages: Some(messages),
            },
        ))
    }
}

/// Notification source fed through an in-process channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<RawNotification>,
}

/// Create a channel-fed source and its sender.
///
/// The sender reports `is_closed()` once the pipeline has released the source.
pub fn channel_source(capacity: usize) -> (mpsc::Sender<RawNotification>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelSource { rx })
}

#[async_trait::async_trait]
impl NotificationSource for ChannelSource {
    async fn next(&mut self) -> Option<Result<RawNotification, StoreError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.rx.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_yields_in_order() {
        let (tx, mut source) = channel_source(4);
        tx.send(RawNotification::new("__keyspace@0__:a", "set"))
            .await
            .unwrap();
        tx.send(RawNotification::new("__keyspace@0__:b", "del"))
            .await
            .unwrap();
        drop(tx);

        let first = source.next().await.unwrap().unwrap();
        assert_eq!(first.payload, "set");
        let second = source.next().await.unwrap().unwrap();
        assert_eq!(second.channel, "__keyspace@0__:b");
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_source_close() {
        let (tx, mut source) = channel_source(1);
        source.close().await.unwrap();
        assert!(tx.is_closed());
        assert!(source.next().await.is_none());
        // Closing twice is harmless.
        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_typed() {
        let config = RedisConfig {
            addr: "127.0.0.1:1".to_string(),
            ..RedisConfig::default()
        };
        let err = Subscriber::connect(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Connect { .. }));
        assert!(err.is_startup());
    }
}
