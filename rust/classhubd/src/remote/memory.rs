use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::{matches_field, merge_fields, Document, Fields, RemoteBackend, RemoteError, RemoteResult, Subscription};

struct Inner {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<Document>>>>,
    available: bool,
    fail_upserts: usize,
    fail_deletes: HashSet<String>,
    upserts_seen: usize,
}

/// In-process document store.
///
/// Clones share state, so several coordinators can talk to one backend the
/// way several machines share one store. Failure injection hooks let tests
/// simulate an unreachable or flaky service.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                collections: HashMap::new(),
                subscribers: HashMap::new(),
                available: true,
                fail_upserts: 0,
                fail_deletes: HashSet::new(),
                upserts_seen: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While unavailable every call fails with `RemoteError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// The next `n` upserts fail; later ones succeed again.
    pub fn fail_next_upserts(&self, n: usize) {
        self.lock().fail_upserts = n;
    }

    pub fn fail_deletes_in(&self, collection: &str) {
        self.lock().fail_deletes.insert(collection.to_string());
    }

    /// Successful upserts since creation.
    pub fn upserts_seen(&self) -> usize {
        self.lock().upserts_seen
    }

    /// Writes a document as another client would, notifying subscribers.
    pub fn seed(&self, collection: &str, id: &str, fields: Fields) {
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        notify(&mut inner, collection);
    }

    /// Sends an arbitrary snapshot to subscribers without touching storage.
    /// Models a delayed or reordered delivery.
    pub fn push_raw(&self, collection: &str, docs: Vec<Document>) {
        let mut inner = self.lock();
        if let Some(subs) = inner.subscribers.get_mut(collection) {
            subs.retain(|tx| tx.send(docs.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(collection) {
            Some(subs) => {
                subs.retain(|tx| !tx.is_closed());
                subs.len()
            }
            None => 0,
        }
    }
}

fn snapshot(inner: &Inner, collection: &str) -> Vec<Document> {
    inner
        .collections
        .get(collection)
        .map(|docs| {
            docs.iter()
                .map(|(id, fields)| Document {
                    id: id.clone(),
                    fields: fields.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn notify(inner: &mut Inner, collection: &str) {
    let docs = snapshot(inner, collection);
    if let Some(subs) = inner.subscribers.get_mut(collection) {
        subs.retain(|tx| tx.send(docs.clone()).is_ok());
    }
}

fn ensure_available(inner: &Inner) -> RemoteResult<()> {
    if inner.available {
        Ok(())
    } else {
        Err(RemoteError::Unavailable("memory backend offline".into()))
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_all(&self, collection: &str) -> RemoteResult<Vec<Document>> {
        let inner = self.lock();
        ensure_available(&inner)?;
        Ok(snapshot(&inner, collection))
    }

    async fn get_one(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        let inner = self.lock();
        ensure_available(&inner)?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn upsert(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> RemoteResult<()> {
        let mut inner = self.lock();
        ensure_available(&inner)?;
        if inner.fail_upserts > 0 {
            inner.fail_upserts -= 1;
            return Err(RemoteError::Rejected(format!("write to {}/{} refused", collection, id)));
        }
        let docs = inner.collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => merge_fields(existing, fields),
            _ => {
                docs.insert(id.to_string(), fields);
            }
        }
        inner.upserts_seen += 1;
        notify(&mut inner, collection);
        Ok(())
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> RemoteResult<()> {
        let mut inner = self.lock();
        ensure_available(&inner)?;
        if inner.fail_deletes.contains(collection) {
            return Err(RemoteError::Rejected(format!("batch delete in {} refused", collection)));
        }
        if let Some(docs) = inner.collections.get_mut(collection) {
            for id in ids {
                docs.remove(id);
            }
        }
        notify(&mut inner, collection);
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> RemoteResult<Subscription> {
        let mut inner = self.lock();
        ensure_available(&inner)?;
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, so the initial send cannot fail.
        let _ = tx.send(snapshot(&inner, collection));
        inner
            .subscribers
            .entry(collection.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(rx))
    }

    async fn query(&self, collection: &str, field: &str, equals: &Value) -> RemoteResult<Vec<Document>> {
        let inner = self.lock();
        ensure_available(&inner)?;
        Ok(snapshot(&inner, collection)
            .into_iter()
            .filter(|d| matches_field(&d.fields, field, equals))
            .collect())
    }
}
