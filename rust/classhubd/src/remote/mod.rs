//! Remote document store seam.
//!
//! A backend exposes named collections of JSON documents. Every operation may
//! fail; callers in `sync` treat failures as "remote unavailable" and carry on
//! with the local cache.

mod memory;
mod shared;

pub use memory::MemoryBackend;
pub use shared::SharedFileBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RemoteConfig;

pub const STUDENTS: &str = "students";

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote backend unavailable: {0}")]
    Unavailable(String),
    #[error("remote rejected the request: {0}")]
    Rejected(String),
    #[error("remote storage error {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("failed to encode or decode document {0}")]
    Codec(#[from] serde_json::Error),
    #[error("remote worker task failed {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Live feed of full collection snapshots. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<Document>>,
    watcher: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<Document>>) -> Self {
        Self { rx, watcher: None }
    }

    /// Subscription fed by a background task that is aborted on drop.
    pub fn with_watcher(rx: mpsc::UnboundedReceiver<Vec<Document>>, watcher: JoinHandle<()>) -> Self {
        Self {
            rx,
            watcher: Some(watcher),
        }
    }

    pub async fn next(&mut self) -> Option<Vec<Document>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// All documents of a collection, ascending by id.
    async fn get_all(&self, collection: &str) -> RemoteResult<Vec<Document>>;

    async fn get_one(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>>;

    /// Writes `fields` under `id`. With `merge` the top-level keys are merged
    /// into an existing document instead of replacing it.
    async fn upsert(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> RemoteResult<()>;

    async fn delete_many(&self, collection: &str, ids: &[String]) -> RemoteResult<()>;

    /// The current snapshot is delivered first, then one per change.
    async fn subscribe(&self, collection: &str) -> RemoteResult<Subscription>;

    async fn query(&self, collection: &str, field: &str, equals: &Value) -> RemoteResult<Vec<Document>>;
}

/// Resolves the configured backend once, when a workspace is opened.
pub fn connect(config: &RemoteConfig) -> Option<Arc<dyn RemoteBackend>> {
    match config {
        RemoteConfig::None => {
            info!("no remote backend configured; running from the local cache only");
            None
        }
        RemoteConfig::Memory => Some(Arc::new(MemoryBackend::new())),
        RemoteConfig::Shared {
            path,
            poll_interval_ms,
        } => match SharedFileBackend::open(path, *poll_interval_ms) {
            Ok(backend) => {
                info!(path = %path.display(), "connected to shared document store");
                Some(Arc::new(backend))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "shared document store unreachable; running offline");
                None
            }
        },
    }
}

pub(crate) fn matches_field(fields: &Fields, field: &str, equals: &Value) -> bool {
    fields.get(field) == Some(equals)
}

pub(crate) fn merge_fields(existing: &mut Fields, incoming: Fields) {
    for (k, v) in incoming {
        existing.insert(k, v);
    }
}
