//! Verb dispatch and value readers.
//!
//! A [`DispatchTable`] maps every supported notification verb to the
//! [`Reader`] able to reconstruct the key after that command. A [`Fetcher`]
//! pairs one table with one store connection; each pipeline owns exactly one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::event::{ChangeEvent, EventType, encode_hash, encode_members};
use crate::pipeline::PipelineError;
use crate::store::{Store, StoreError};

/// Verbs grouped by the reader that handles them.
const STRING_VERBS: &[&str] = &[
    "set",
    "append",
    "setrange",
    "incrby",
    "incrbyfloat",
    "incr",
    "decrby",
    "decr",
];
const HASH_VERBS: &[&str] = &["hset", "hincrby", "hincrbyfloat", "hmset", "hsetnx"];
const SET_VERBS: &[&str] = &[
    "sadd",
    "srem",
    "spop",
    "sinterstore",
    "sunionstore",
    "sdiffstore",
];
const SORTED_SET_VERBS: &[&str] = &[
    "zadd",
    "zrem",
    "zrembyscore",
    "zrembyrank",
    "zinterstore",
    "zdiffstore",
    "zunionstore",
];
const LIST_VERBS: &[&str] = &[
    "lpush",
    "rpush",
    "lpop",
    "rpop",
    "lpushx",
    "rpushx",
    "linsert",
    "blpop",
    "brpop",
    "ltrim",
    "lpoprpush",
    "lset",
    "sortstore",
];

/// Stateless reconstruction of one key after a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reader {
    /// `GET`, data is the raw value.
    String,
    /// `HGETALL`, data is a JSON object.
    Hash,
    /// `SMEMBERS`, data is a sorted JSON array.
    Set,
    /// `ZRANGE 0 -1`, data is a JSON array in score order.
    SortedSet,
    /// `LRANGE 0 -1`, data is a JSON array.
    List,
    /// No read; the key is gone.
    Delete,
    /// No read; a TTL was set or fired.
    Expire,
    /// No read; the key was renamed.
    Rename,
}

impl Reader {
    /// Type tag of the events this reader produces.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::String => EventType::String,
            Self::Hash => EventType::Hash,
            Self::Set => EventType::Set,
            Self::SortedSet => EventType::SortedSet,
            Self::List => EventType::List,
            Self::Delete => EventType::Delete,
            Self::Expire => EventType::Expire,
            Self::Rename => EventType::Rename,
        }
    }

    /// Read `key` from the store and build its change event.
    ///
    /// Synthetic readers return immediately without touching the store.
    pub async fn read<S: Store + ?Sized>(
        &self,
        store: &S,
        op: &str,
        key: &str,
    ) -> Result<ChangeEvent, PipelineError> {
        let ty = self.event_type();
        let read_err = |source: StoreError| PipelineError::Read {
            key: key.to_string(),
            op: op.to_string(),
            source,
        };
        let encode_err = |source: serde_json::Error| PipelineError::Encode {
            key: key.to_string(),
            op: op.to_string(),
            source,
        };

        let data = match self {
            Self::Delete | Self::Expire | Self::Rename => {
                return Ok(ChangeEvent::synthetic(key, ty, op));
            }
            Self::String => store
                .get(key)
                .await
                .map_err(read_err)?
                .ok_or_else(|| read_err(StoreError::KeyNotFound))?,
            Self::Hash => {
                let fields = store.hgetall(key).await.map_err(read_err)?;
                encode_hash(&fields).map_err(encode_err)?
            }
            Self::Set => {
                let mut members = store.smembers(key).await.map_err(read_err)?;
                members.sort_unstable();
                encode_members(&members).map_err(encode_err)?
            }
            Self::SortedSet => {
                let members = store.zrange_all(key).await.map_err(read_err)?;
                encode_members(&members).map_err(encode_err)?
            }
            Self::List => {
                let elements = store.lrange_all(key).await.map_err(read_err)?;
                encode_members(&elements).map_err(encode_err)?
            }
        };

        Ok(ChangeEvent::new(key, ty, op, data))
    }
}

/// Immutable verb → reader mapping.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    readers: HashMap<&'static str, Reader>,
}

impl DispatchTable {
    /// Build the table of every supported verb.
    pub fn new() -> Self {
        let groups: [(&[&'static str], Reader); 8] = [
            (STRING_VERBS, Reader::String),
            (HASH_VERBS, Reader::Hash),
            (SET_VERBS, Reader::Set),
            (SORTED_SET_VERBS, Reader::SortedSet),
            (LIST_VERBS, Reader::List),
            (&["del"], Reader::Delete),
            (&["expire", "expired"], Reader::Expire),
            (&["rename_from", "rename_to"], Reader::Rename),
        ];

        let readers = groups
            .into_iter()
            .flat_map(|(verbs, reader)| verbs.iter().map(move |verb| (*verb, reader)))
            .collect();

        Self { readers }
    }

    /// Reader registered for a verb.
    pub fn lookup(&self, op: &str) -> Option<Reader> {
        self.readers.get(op).copied()
    }

    /// Number of registered verbs.
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// All registered verbs with their readers, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, Reader)> + '_ {
        self.readers.iter().map(|(verb, reader)| (*verb, *reader))
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A dispatch table bound to one store connection.
pub struct Fetcher<S: Store> {
    store: Arc<S>,
    table: DispatchTable,
}

impl<S: Store> Fetcher<S> {
    /// Bind a fresh dispatch table to a store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            table: DispatchTable::new(),
        }
    }

    /// Reconstruct `key` after the command `op`.
    ///
    /// # Errors
    /// `UnsupportedOperation` for verbs outside the table, otherwise whatever
    /// the reader reports.
    pub async fn fetch(&self, op: &str, key: &str) -> Result<ChangeEvent, PipelineError> {
        let reader = self
            .table
            .lookup(op)
            .ok_or_else(|| PipelineError::UnsupportedOperation {
                key: key.to_string(),
                op: op.to_string(),
            })?;
        reader.read(self.store.as_ref(), op, key).await
    }

    /// The table this fetcher dispatches through.
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// The bound store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: Store> std::fmt::Debug for Fetcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("verbs", &self.table.len())
            .finish_non_exhaustive()
    }
}
