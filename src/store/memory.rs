// src/store/memory.rs
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{ContentStore, Expected, StoreError, Versioned};

/// Process-local store. Used by tests and as a fallback when no state dir is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic while holding the lock cannot leave a map entry half-written,
    /// so a poisoned lock is taken over as-is.
    fn map(&self) -> MutexGuard<'_, HashMap<String, Versioned>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn keys(&self) -> Vec<String> {
        let g = self.map();
        let mut keys: Vec<String> = g.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    pub(crate) fn bump_for_test(&self, key: &str) {
        let mut g = self.map();
        if let Some(v) = g.get_mut(key) {
            v.version += 1;
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let g = self.map();
        Ok(g.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value, expected: Expected) -> Result<u64, StoreError> {
        let mut g = self.map();
        let current = g.get(key).map(|v| v.version);
        if !expected.admits(current) {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                found: current,
            });
        }
        let version = current.unwrap_or(0) + 1;
        g.insert(key.to_string(), Versioned { version, value });
        Ok(version)
    }

    async fn delete(&self, key: &str, expected: Expected) -> Result<(), StoreError> {
        let mut g = self.map();
        let current = g.get(key).map(|v| v.version);
        if !expected.admits(current) {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                found: current,
            });
        }
        g.remove(key);
        Ok(())
    }
}
