//! In-memory record store, used by tests and as the default backend when
//! no store path is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{KILL_LIST_KEY, traits::RecordStore};

/// HashMap-backed store. The single mutex makes the kill-list
/// read-then-remove atomic without further coordination.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn add_kill(&self, task_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let mut list: Vec<String> = match entries.get(KILL_LIST_KEY) {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };
        if !list.iter().any(|id| id == task_id) {
            list.push(task_id.to_string());
        }
        entries.insert(KILL_LIST_KEY.to_string(), serde_json::to_string(&list)?);
        Ok(())
    }

    async fn consume_kill(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        let mut list: Vec<String> = match entries.get(KILL_LIST_KEY) {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };
        let before = list.len();
        list.retain(|id| id != task_id);
        let hit = list.len() != before;
        entries.insert(KILL_LIST_KEY.to_string(), serde_json::to_string(&list)?);
        Ok(hit)
    }
}
