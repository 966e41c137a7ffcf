use anyhow::anyhow;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Synchronous, durable key-value storage for cached snapshots and
/// preferences. Reads never fail from the caller's point of view.
pub trait LocalStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

pub fn get_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, error = %e, "ignoring malformed cached value");
            None
        }
    }
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    fail_writes: bool,
    failing_keys: HashSet<String>,
}

impl MemoryInner {
    fn check_writable(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_writes || self.failing_keys.contains(key) {
            return Err(anyhow!("storage quota exceeded"));
        }
        Ok(())
    }
}

/// In-memory store. Clones share the same map, so a test can keep a handle
/// after passing one to the coordinator.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `set`/`remove` fail, like a full disk.
    pub fn fail_writes(&self, fail: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.fail_writes = fail;
        if !fail {
            inner.failing_keys.clear();
        }
    }

    /// Makes writes to `key` alone fail until `fail_writes(false)`.
    pub fn fail_writes_for(&self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_keys
            .insert(key.to_string());
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .get(key)
            .cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.check_writable(key)?;
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.check_writable(key)?;
        inner.values.remove(key);
        Ok(())
    }
}
