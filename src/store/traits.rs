//! Backend-agnostic record store trait.

use async_trait::async_trait;

use crate::error::StoreError;

/// Key-value persistence for JSON-serialized records.
///
/// Every write is an unconditional overwrite of the full value at the key;
/// there is no optimistic-concurrency check. The job-id space guarantees a
/// single live writer per task key, so last-write-wins is sufficient.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Overwrite the value at `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read the value at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete the value at `key`. Missing keys are a no-op.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Add `task_id` to the kill list.
    async fn add_kill(&self, task_id: &str) -> Result<(), StoreError>;

    /// Atomically remove `task_id` from the kill list, returning whether it
    /// was present. Consume-once: a second call for the same insertion
    /// returns false.
    async fn consume_kill(&self, task_id: &str) -> Result<bool, StoreError>;
}
