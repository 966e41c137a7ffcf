use crate::store::LocalStore;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::warn;

pub const DB_FILE: &str = "classhub.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS local_cache(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    Ok(conn)
}

/// Local cache backed by the workspace SQLite file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        let found = self
            .conn
            .query_row(
                "SELECT value FROM local_cache WHERE key = ?",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional();
        match found {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "local cache read failed");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO local_cache(key, value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, chrono::Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM local_cache WHERE key = ?", [key])?;
        Ok(())
    }
}
