//! libSQL record store backend.
//!
//! One table, `kv_records(key, value)`. The kill list lives in the same
//! table under its reserved key so both backends share one wire shape.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;
use crate::store::{KILL_LIST_KEY, traits::RecordStore};

/// libSQL store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// Serializes kill-list read-modify-write cycles.
    kill_lock: Mutex<()>,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unreachable(format!("Failed to create store directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unreachable(format!("Failed to open libSQL store: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unreachable(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            kill_lock: Mutex::new(()),
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Unreachable(format!("Failed to create store: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unreachable(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            kill_lock: Mutex::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS kv_records (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv_records WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => {
                let value: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO kv_records (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![key, value],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LibSqlStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv_records WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn add_kill(&self, task_id: &str) -> Result<(), StoreError> {
        let _guard = self.kill_lock.lock().await;
        let mut list: Vec<String> = match self.read(KILL_LIST_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        if !list.iter().any(|id| id == task_id) {
            list.push(task_id.to_string());
        }
        self.write(KILL_LIST_KEY, &serde_json::to_string(&list)?)
            .await
    }

    async fn consume_kill(&self, task_id: &str) -> Result<bool, StoreError> {
        let _guard = self.kill_lock.lock().await;
        let mut list: Vec<String> = match self.read(KILL_LIST_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let before = list.len();
        list.retain(|id| id != task_id);
        let hit = list.len() != before;
        self.write(KILL_LIST_KEY, &serde_json::to_string(&list)?)
            .await?;
        Ok(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_and_overwrite() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.set("task:x", "{\"a\":1}").await.unwrap();
        store.set("task:x", "{\"a\":2}").await.unwrap();
        assert_eq!(
            store.get("task:x").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );
    }

    #[tokio::test]
    async fn kill_consume_once_semantics() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.add_kill("t9").await.unwrap();
        assert!(store.consume_kill("t9").await.unwrap());
        assert!(!store.consume_kill("t9").await.unwrap());
    }
}
