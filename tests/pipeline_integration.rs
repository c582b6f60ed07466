//! Pipeline Integration Tests
//!
//! End-to-end runs over an in-memory store and a channel-fed notification
//! source: notification in, change event or error out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keyspace_forward::event::{EventData, decode_event, encode_event};
use keyspace_forward::pipeline::{
    PipelineBuilder, PipelineError, PipelineHandles, RawNotification, channel_source,
};
use keyspace_forward::{ChangeEvent, EventType, MemoryStore, Store, StoreError};
use tokio::sync::{Semaphore, mpsc};

// =============================================================================
// Test Helpers
// =============================================================================

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn raw(op: &str, key: &str) -> RawNotification {
    RawNotification::new(format!("__keyspace@0__:{key}"), op)
}

/// Start a pipeline over `store` with a small worker pool.
fn start(store: &MemoryStore) -> (mpsc::Sender<RawNotification>, PipelineHandles) {
    start_with(store, PipelineBuilder::new(0).workers(4))
}

fn start_with(
    store: &MemoryStore,
    builder: PipelineBuilder,
) -> (mpsc::Sender<RawNotification>, PipelineHandles) {
    let (tx, source) = channel_source(16);
    let handles = builder
        .build(store.clone(), source)
        .expect("Failed to build pipeline");
    (tx, handles)
}

/// Drain both streams until the pipeline closes them.
async fn collect(handles: PipelineHandles) -> (Vec<ChangeEvent>, Vec<PipelineError>) {
    let PipelineHandles {
        mut events,
        mut errors,
        shutdown,
    } = handles;

    let drain = async {
        let mut out_events = Vec::new();
        let mut out_errors = Vec::new();
        let mut events_open = true;
        let mut errors_open = true;
        while events_open || errors_open {
            tokio::select! {
                e = events.recv(), if events_open => match e {
                    Some(e) => out_events.push(e),
                    None => events_open = false,
                },
                e = errors.recv(), if errors_open => match e {
                    Some(e) => out_errors.push(e),
                    None => errors_open = false,
                },
            }
        }
        (out_events, out_errors)
    };

    let out = tokio::time::timeout(TEST_TIMEOUT, drain)
        .await
        .expect("Pipeline did not close its streams");
    shutdown.wait().await;
    out
}

// =============================================================================
// Event Reconstruction
// =============================================================================

#[tokio::test]
async fn test_hash_write_produces_hash_event() {
    let store = MemoryStore::new();
    store.hset("user:1", "name", "Alice").unwrap();

    let (tx, handles) = start(&store);
    tx.send(raw("hset", "user:1")).await.unwrap();
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert!(errors.is_empty());
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event.key, "user:1");
    assert_eq!(event.event_type, EventType::Hash);
    assert_eq!(event.op, "hset");
    assert_eq!(event.data_str(), Some(r#"{"name":"Alice"}"#));

    let mut expected = BTreeMap::new();
    expected.insert("name".to_string(), "Alice".to_string());
    assert_eq!(EventData::decode(event).unwrap(), EventData::Hash(expected));
}

#[tokio::test]
async fn test_incr_reads_current_value() {
    let store = MemoryStore::new();
    store.set("counter", "5");
    assert_eq!(store.incr_by("counter", 1).unwrap(), 6);

    let (tx, handles) = start(&store);
    tx.send(raw("incrby", "counter")).await.unwrap();
    drop(tx);

    let (events, _) = collect(handles).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::String);
    assert_eq!(events[0].data, b"6");
}

#[tokio::test]
async fn test_delete_is_synthetic() {
    let store = MemoryStore::new();
    let (tx, handles) = start(&store);
    tx.send(raw("del", "session:9")).await.unwrap();
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert!(errors.is_empty());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Delete);
    assert!(events[0].data.is_empty());
    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn test_rename_pair_keeps_direction_in_op() {
    let store = MemoryStore::new();
    let (tx, handles) = start(&store);
    tx.send(raw("rename_from", "old")).await.unwrap();
    tx.send(raw("rename_to", "new")).await.unwrap();
    drop(tx);

    let (mut events, _) = collect(handles).await;
    events.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].key, "new");
    assert_eq!(events[0].op, "rename_to");
    assert_eq!(events[1].op, "rename_from");
    assert!(events.iter().all(|e| e.event_type == EventType::Rename));
}

#[tokio::test]
async fn test_composite_types() {
    let store = MemoryStore::new();
    store.sadd("tags", "rust").unwrap();
    store.sadd("tags", "async").unwrap();
    store.zadd("board", 2.0, "bob").unwrap();
    store.zadd("board", 1.0, "alice").unwrap();
    store.rpush("queue", "a").unwrap();
    store.rpush("queue", "b").unwrap();

    let (tx, handles) = start(&store);
    tx.send(raw("sadd", "tags")).await.unwrap();
    tx.send(raw("zadd", "board")).await.unwrap();
    tx.send(raw("rpush", "queue")).await.unwrap();
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert!(errors.is_empty());
    let by_key: BTreeMap<_, _> = events.iter().map(|e| (e.key.as_str(), e)).collect();

    assert_eq!(by_key["tags"].event_type, EventType::Set);
    assert_eq!(by_key["tags"].data_str(), Some(r#"["async","rust"]"#));
    assert_eq!(by_key["board"].event_type, EventType::SortedSet);
    assert_eq!(by_key["board"].data_str(), Some(r#"["alice","bob"]"#));
    assert_eq!(by_key["queue"].event_type, EventType::List);
    assert_eq!(by_key["queue"].data_str(), Some(r#"["a","b"]"#));
}

#[tokio::test]
async fn test_events_survive_wire_encoding() {
    let store = MemoryStore::new();
    store.set("greeting", "hello");

    let (tx, handles) = start(&store);
    tx.send(raw("set", "greeting")).await.unwrap();
    drop(tx);

    let (events, _) = collect(handles).await;
    let bytes = encode_event(&events[0]).unwrap();
    assert_eq!(decode_event(&bytes).unwrap(), events[0]);
}

// =============================================================================
// Error Isolation
// =============================================================================

#[tokio::test]
async fn test_unsupported_verb_reports_error_only() {
    let store = MemoryStore::new();
    store.set("a", "1");

    let (tx, handles) = start(&store);
    tx.send(raw("xadd", "stream:1")).await.unwrap();
    tx.send(raw("set", "a")).await.unwrap();
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "a");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        PipelineError::UnsupportedOperation { key, op } => {
            assert_eq!(key, "stream:1");
            assert_eq!(op, "xadd");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_read_failures_do_not_stop_pipeline() {
    let store = MemoryStore::new();
    store.hset("h", "f", "v").unwrap();
    store.set("ok", "fine");

    let (tx, handles) = start(&store);
    // Hash read as string, then a string that no longer exists.
    tx.send(raw("set", "h")).await.unwrap();
    tx.send(raw("set", "missing")).await.unwrap();
    tx.send(raw("set", "ok")).await.unwrap();
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert_eq!(events.len(), 1);
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, PipelineError::Read { .. }))
    );
}

#[tokio::test]
async fn test_foreign_keyspace_is_malformed() {
    let store = MemoryStore::new();
    let (tx, handles) = start(&store);
    tx.send(RawNotification::new("__keyspace@7__:k", "set"))
        .await
        .unwrap();
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert!(events.is_empty());
    assert!(matches!(
        &errors[0],
        PipelineError::MalformedNotification { channel } if channel == "__keyspace@7__:k"
    ));
}

// =============================================================================
// Throughput and Concurrency
// =============================================================================

#[tokio::test]
async fn test_distinct_keys_each_produce_one_event() {
    const N: usize = 200;
    let store = MemoryStore::new();
    for i in 0..N {
        store.set(format!("k{i}"), i.to_string());
    }

    let (tx, handles) = start(&store);
    let producer = tokio::spawn(async move {
        for i in 0..N {
            tx.send(raw("set", &format!("k{i}"))).await.unwrap();
        }
    });

    let (events, errors) = collect(handles).await;
    producer.await.unwrap();
    assert!(errors.is_empty());
    assert_eq!(events.len(), N);

    let mut keys: Vec<_> = events.iter().map(|e| e.key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), N);
}

#[tokio::test]
async fn test_small_intake_queue_loses_nothing() {
    const N: usize = 64;
    let store = MemoryStore::new();
    for i in 0..N {
        store.set(format!("k{i}"), "v");
    }

    let (tx, handles) = start_with(
        &store,
        PipelineBuilder::new(0)
            .workers(2)
            .intake_capacity(1)
            .output_capacity(1),
    );
    let producer = tokio::spawn(async move {
        for i in 0..N {
            tx.send(raw("set", &format!("k{i}"))).await.unwrap();
        }
    });

    let (events, _) = collect(handles).await;
    producer.await.unwrap();
    assert_eq!(events.len(), N);
}

/// Store whose string reads park until the test releases them.
#[derive(Clone)]
struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
}

impl GatedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn wait_for_reads(&self, n: usize) {
        tokio::time::timeout(TEST_TIMEOUT, async {
            while self.entered.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Reads never reached the store");
    }
}

#[async_trait]
impl Store for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        self.inner.get(key).await
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.inner.hgetall(key).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.smembers(key).await
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.zrange_all(key).await
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.lrange_all(key).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_same_key_reads_race_with_later_mutation() {
    let store = MemoryStore::new();
    let gated = GatedStore::new(store.clone());
    let (tx, source) = channel_source(4);
    let handles = PipelineBuilder::new(0)
        .workers(2)
        .build(gated.clone(), source)
        .unwrap();

    // First mutation and its notification; the read parks in the store.
    store.set("counter", "1");
    tx.send(raw("set", "counter")).await.unwrap();
    gated.wait_for_reads(1).await;

    // Second mutation lands while the first read is still in flight.
    assert_eq!(store.incr_by("counter", 1).unwrap(), 2);
    tx.send(raw("incrby", "counter")).await.unwrap();
    gated.wait_for_reads(2).await;

    gated.gate.add_permits(2);
    drop(tx);

    let (events, errors) = collect(handles).await;
    assert!(errors.is_empty());
    assert_eq!(events.len(), 2);

    let value = |op: &str| -> i64 {
        let event = events.iter().find(|e| e.op == op).unwrap();
        event.data_str().unwrap().parse().unwrap()
    };
    // Each event reflects the store at read time, never older than its trigger.
    assert!(value("set") >= 1);
    assert!(value("incrby") >= 2);
    // The earlier notification observed the later mutation.
    assert_eq!(value("set"), 2);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_concurrent_shutdown_releases_once() {
    let store = MemoryStore::new();
    let (tx, handles) = start(&store);

    let a = handles.shutdown.clone();
    let b = handles.shutdown.clone();
    tokio::join!(a.shutdown(), b.shutdown());
    handles.shutdown.shutdown().await;

    assert!(handles.shutdown.is_closed());
    assert_eq!(store.close_count(), 1);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn test_streams_close_after_shutdown() {
    let store = MemoryStore::new();
    let (_tx, mut handles) = start(&store);

    handles.shutdown.shutdown().await;

    assert!(handles.events.recv().await.is_none());
    assert!(handles.errors.recv().await.is_none());
}

#[tokio::test]
async fn test_shutdown_without_consumer_does_not_hang() {
    let store = MemoryStore::new();
    for i in 0..8 {
        store.set(format!("k{i}"), "v");
    }

    let (tx, handles) = start_with(
        &store,
        PipelineBuilder::new(0)
            .workers(2)
            .output_capacity(1)
            .drain_timeout(Duration::from_millis(100)),
    );
    for i in 0..8 {
        tx.send(raw("set", &format!("k{i}"))).await.unwrap();
    }
    // Let workers fill the output buffer and block.
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(TEST_TIMEOUT, handles.shutdown.shutdown())
        .await
        .expect("Shutdown hung with a full output buffer");
    assert!(handles.shutdown.is_closed());
    assert_eq!(store.close_count(), 1);
}

#[tokio::test]
async fn test_source_end_stops_pipeline() {
    let store = MemoryStore::new();
    let (tx, handles) = start(&store);
    drop(tx);

    tokio::time::timeout(TEST_TIMEOUT, handles.shutdown.wait())
        .await
        .expect("Pipeline did not stop after its source ended");
    assert!(handles.shutdown.is_closed());
    assert_eq!(store.close_count(), 1);

    // Shutdown after a natural stop is a no-op.
    handles.shutdown.shutdown().await;
    assert_eq!(store.close_count(), 1);
}

#[tokio::test]
async fn test_zero_workers_rejected() {
    let store = MemoryStore::new();
    let (_tx, source) = channel_source(1);
    let result = PipelineBuilder::new(0).workers(0).build(store, source);
    assert!(matches!(result, Err(PipelineError::Config(_))));
}
