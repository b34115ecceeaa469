// src/store/mod.rs
//! Key-value content store shared by the scheduler and the approval worker.
//!
//! Every key carries a version. Writes name the version they expect, so a
//! read-modify-write that raced with another writer fails with
//! [`StoreError::Conflict`] instead of silently overwriting. [`update`] wraps the
//! retry loop.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub const KEY_PROCESSED_IDS: &str = "processed_news_ids";
pub const KEY_CURRENT_BATCH: &str = "current_batch";

pub fn batch_key(batch_id: &str) -> String {
    format!("batch:{batch_id}")
}

pub fn brief_key(brief_id: &str) -> String {
    format!("brief:{brief_id}")
}

/// Bounded attempts for [`update`] before a conflict is surfaced.
const MAX_UPDATE_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict on '{key}': expected {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Expected,
        found: Option<u64>,
    },
    #[error("serialization for '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store io for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Precondition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Unconditional write.
    Any,
    /// Key must not exist yet.
    Absent,
    /// Key must currently be at this version.
    Version(u64),
}

impl Expected {
    pub fn admits(self, current: Option<u64>) -> bool {
        match (self, current) {
            (Expected::Any, _) => true,
            (Expected::Absent, None) => true,
            (Expected::Absent, Some(_)) => false,
            (Expected::Version(v), Some(c)) => v == c,
            (Expected::Version(_), None) => false,
        }
    }

    fn from_current(current: Option<u64>) -> Self {
        match current {
            Some(v) => Expected::Version(v),
            None => Expected::Absent,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub value: Value,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError>;
    /// Write `value`, returning the new version.
    async fn put(&self, key: &str, value: Value, expected: Expected) -> Result<u64, StoreError>;
    /// Delete `key`. Deleting an absent key with `Expected::Any` is a no-op.
    async fn delete(&self, key: &str, expected: Expected) -> Result<(), StoreError>;
}

/// Outcome of one [`update`] closure invocation.
pub enum Change<T> {
    Unchanged,
    Put(T),
    Delete,
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn ContentStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(v) => decode(key, v.value).map(Some),
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize>(
    store: &dyn ContentStore,
    key: &str,
    value: &T,
) -> Result<u64, StoreError> {
    store.put(key, encode(key, value)?, Expected::Any).await
}

/// Read-modify-write with optimistic concurrency. `f` may run more than once when
/// another writer gets in between; it must not have side effects outside its return value.
pub async fn update<T, R, F>(store: &dyn ContentStore, key: &str, mut f: F) -> Result<R, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> (Change<T>, R),
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = store.get(key).await?;
        let version = current.as_ref().map(|v| v.version);
        let decoded = match current {
            Some(v) => Some(decode::<T>(key, v.value)?),
            None => None,
        };
        let (change, out) = f(decoded);
        let expected = Expected::from_current(version);
        let res = match change {
            Change::Unchanged => return Ok(out),
            Change::Put(v) => store.put(key, encode(key, &v)?, expected).await.map(|_| ()),
            Change::Delete => {
                if version.is_none() {
                    return Ok(out);
                }
                store.delete(key, expected).await
            }
        };
        match res {
            Ok(()) => return Ok(out),
            Err(StoreError::Conflict { .. }) if attempt < MAX_UPDATE_ATTEMPTS => {
                tracing::debug!(target: "store", key, attempt, "version conflict, retrying");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })
}
