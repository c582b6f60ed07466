//! In-memory store.
//!
//! A typed keyspace with just enough write commands to stage values for the
//! readers. Clones share the same keyspace, so a test can keep one handle
//! for writes while the pipeline reads through another.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::store::{Store, StoreError};

/// A single stored value.
#[derive(Debug, Clone)]
enum Value {
    String(Vec<u8>),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(Vec<(f64, String)>),
    List(VecDeque<String>),
}

#[derive(Debug, Default)]
struct Inner {
    keys: RwLock<HashMap<String, Value>>,
    reads: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read calls served so far.
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of times [`Store::close`] has been called.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// `SET key value`.
    pub fn set(&self, key: impl Into<String>, value: impl AsRef<[u8]>) {
        self.write()
            .insert(key.into(), Value::String(value.as_ref().to_vec()));
    }

    /// `INCRBY key delta`, returning the new value.
    pub fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut keys = self.write();
        let current = match keys.get(key) {
            None => 0,
            Some(Value::String(raw)) => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StoreError::WrongType)?,
            Some(_) => return Err(StoreError::WrongType),
        };
        let next = current + delta;
        keys.insert(key.to_string(), Value::String(next.to_string().into_bytes()));
        Ok(next)
    }

    /// `HSET key field value`.
    pub fn hset(
        &self,
        key: &str,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut keys = self.write();
        match keys
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(BTreeMap::new()))
        {
            Value::Hash(h) => {
                h.insert(field.into(), value.into());
                Ok(())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    /// `SADD key member`.
    pub fn sadd(&self, key: &str, member: impl Into<String>) -> Result<(), StoreError> {
        let mut keys = self.write();
        match keys
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(BTreeSet::new()))
        {
            Value::Set(s) => {
                s.insert(member.into());
                Ok(())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    /// `ZADD key score member`.
    pub fn zadd(&self, key: &str, score: f64, member: impl Into<String>) -> Result<(), StoreError> {
        let member = member.into();
        let mut keys = self.write();
        match keys
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(Vec::new()))
        {
            Value::SortedSet(z) => {
                z.retain(|(_, m)| *m != member);
                z.push((score, member));
                z.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                Ok(())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    /// `RPUSH key value`.
    pub fn rpush(&self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        self.push(key, value.into(), false)
    }

    /// `LPUSH key value`.
    pub fn lpush(&self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        self.push(key, value.into(), true)
    }

    /// `DEL key`, returning whether the key existed.
    pub fn del(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    fn push(&self, key: &str, value: String, front: bool) -> Result<(), StoreError> {
        let mut keys = self.write();
        match keys
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()))
        {
            Value::List(l) if front => {
                l.push_front(value);
                Ok(())
            }
            Value::List(l) => {
                l.push_back(value);
                Ok(())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.inner.keys.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a key for a read, counting the call.
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        let keys = self.inner.keys.read().unwrap_or_else(|e| e.into_inner());
        Ok(keys.get(key).cloned())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.read(key)? {
            None => Ok(None),
            Some(Value::String(v)) => Ok(Some(v)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        match self.read(key)? {
            None => Ok(BTreeMap::new()),
            Some(Value::Hash(h)) => Ok(h),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.read(key)? {
            None => Ok(Vec::new()),
            Some(Value::Set(s)) => Ok(s.into_iter().collect()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.read(key)? {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(z)) => Ok(z.into_iter().map(|(_, m)| m).collect()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.read(key)? {
            None => Ok(Vec::new()),
            Some(Value::List(l)) => Ok(l.into_iter().collect()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
