use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{matches_field, merge_fields, Document, Fields, RemoteBackend, RemoteResult, Subscription};

/// Document store kept in a SQLite file that several daemons can open, for
/// example on a network share. Subscriptions poll a per-collection revision.
#[derive(Clone)]
pub struct SharedFileBackend {
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
}

impl SharedFileBackend {
    pub fn open(path: &Path, poll_interval_ms: u64) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents(
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                updated_at TEXT,
                PRIMARY KEY(collection, id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS revisions(
                collection TEXT PRIMARY KEY,
                revision INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: Duration::from_millis(poll_interval_ms.max(10)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RemoteResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *guard)
        })
        .await?
    }
}

fn read_collection(conn: &Connection, collection: &str) -> RemoteResult<Vec<Document>> {
    let mut stmt = conn.prepare("SELECT id, fields FROM documents WHERE collection = ? ORDER BY id")?;
    let rows = stmt
        .query_map([collection], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for (id, raw) in rows {
        match serde_json::from_str::<Fields>(&raw) {
            Ok(fields) => out.push(Document { id, fields }),
            Err(e) => warn!(collection, id = %id, error = %e, "skipping undecodable shared document"),
        }
    }
    Ok(out)
}

fn read_revision(conn: &Connection, collection: &str) -> RemoteResult<i64> {
    let rev = conn
        .query_row(
            "SELECT revision FROM revisions WHERE collection = ?",
            [collection],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    Ok(rev.unwrap_or(0))
}

/// Revision and documents read inside one transaction.
fn read_versioned(conn: &mut Connection, collection: &str) -> RemoteResult<(i64, Vec<Document>)> {
    let tx = conn.transaction()?;
    let rev = read_revision(&tx, collection)?;
    let docs = read_collection(&tx, collection)?;
    tx.commit()?;
    Ok((rev, docs))
}

fn bump_revision(conn: &Connection, collection: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO revisions(collection, revision) VALUES (?, 1)
         ON CONFLICT(collection) DO UPDATE SET revision = revision + 1",
        [collection],
    )?;
    Ok(())
}

#[async_trait]
impl RemoteBackend for SharedFileBackend {
    fn name(&self) -> &'static str {
        "shared"
    }

    async fn get_all(&self, collection: &str) -> RemoteResult<Vec<Document>> {
        let collection = collection.to_string();
        self.with_conn(move |conn| read_collection(conn, &collection)).await
    }

    async fn get_one(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT fields FROM documents WHERE collection = ? AND id = ?",
                    (&collection, &id),
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            match raw {
                Some(raw) => Ok(Some(Document {
                    id,
                    fields: serde_json::from_str(&raw)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn upsert(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> RemoteResult<()> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut next = fields;
            if merge {
                let existing = tx
                    .query_row(
                        "SELECT fields FROM documents WHERE collection = ? AND id = ?",
                        (&collection, &id),
                        |r| r.get::<_, String>(0),
                    )
                    .optional()?;
                if let Some(raw) = existing {
                    let mut current: Fields = serde_json::from_str(&raw)?;
                    merge_fields(&mut current, next);
                    next = current;
                }
            }
            let encoded = serde_json::to_string(&next)?;
            tx.execute(
                "INSERT INTO documents(collection, id, fields, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(collection, id) DO UPDATE SET
                   fields = excluded.fields,
                   updated_at = excluded.updated_at",
                (&collection, &id, &encoded, chrono::Utc::now().to_rfc3339()),
            )?;
            bump_revision(&tx, &collection)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> RemoteResult<()> {
        let collection = collection.to_string();
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM documents WHERE collection = ? AND id = ?")?;
                for id in &ids {
                    stmt.execute((&collection, id))?;
                }
            }
            bump_revision(&tx, &collection)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn subscribe(&self, collection: &str) -> RemoteResult<Subscription> {
        let initial = {
            let collection = collection.to_string();
            self.with_conn(move |conn| read_versioned(conn, &collection))
                .await?
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let (mut seen, docs) = initial;
        let _ = tx.send(docs);

        let backend = self.clone();
        let collection = collection.to_string();
        let watcher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(backend.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let name = collection.clone();
                let polled = backend
                    .with_conn(move |conn| read_versioned(conn, &name))
                    .await;
                match polled {
                    Ok((rev, docs)) if rev != seen => {
                        debug!(collection = %collection, revision = rev, "shared collection changed");
                        seen = rev;
                        if tx.send(docs).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(collection = %collection, error = %e, "polling shared store failed"),
                }
            }
        });
        Ok(Subscription::with_watcher(rx, watcher))
    }

    async fn query(&self, collection: &str, field: &str, equals: &Value) -> RemoteResult<Vec<Document>> {
        let docs = self.get_all(collection).await?;
        Ok(docs
            .into_iter()
            .filter(|d| matches_field(&d.fields, field, equals))
            .collect())
    }
}
