//! Job lifecycle transitions.
//!
//! Legal path: PENDING -> STARTED -> SUCCESS | FAILED. Every transition is
//! an unconditional overwrite of the full record; the task_id space
//! guarantees one live writer per key.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, ErrorBody, Result, StoreError};
use crate::queue::record::{GeneralStatus, JobRecord, TaskStatus, epoch_string};
use crate::store::{RecordStore, task_key};

/// Manages job record state against the record store.
#[derive(Clone)]
pub struct TaskLifecycle {
    store: Arc<dyn RecordStore>,
    worker_name: String,
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn RecordStore>, worker_name: impl Into<String>) -> Self {
        Self {
            store,
            worker_name: worker_name.into(),
        }
    }

    /// Allocate and persist a fresh PENDING record. Returns the submission
    /// time alongside the record.
    pub async fn create(&self) -> Result<(chrono::DateTime<Utc>, JobRecord)> {
        let now = Utc::now();
        let record = JobRecord::new(&self.worker_name, now);
        self.persist(&record).await?;
        Ok((now, record))
    }

    /// Worker picked the job up. `general_status=SUCCESS` here means the
    /// record write succeeded, not that the job did.
    pub async fn mark_started(&self, record: &mut JobRecord) -> Result<()> {
        record.status.general_status = GeneralStatus::Success;
        record.status.task_status = Some(TaskStatus::Started);
        self.persist(record).await
    }

    /// Terminal failure.
    pub async fn mark_failed(&self, record: &mut JobRecord, err: ErrorBody) -> Result<()> {
        record.time.end_generate = Some(epoch_string(Utc::now()));
        record.status.task_status = Some(TaskStatus::Failed);
        record.error = Some(err);
        self.persist(record).await
    }

    /// Terminal success.
    pub async fn mark_succeeded(
        &self,
        record: &mut JobRecord,
        result: serde_json::Value,
    ) -> Result<()> {
        record.time.end_generate = Some(epoch_string(Utc::now()));
        record.status.task_status = Some(TaskStatus::Success);
        record.task_result = Some(result);
        self.persist(record).await
    }

    /// The broker rejected the submission, so no worker will ever write a
    /// terminal state. The submitting side closes that gap here.
    pub async fn mark_submit_failed(&self, record: &mut JobRecord, err: ErrorBody) -> Result<()> {
        record.status.general_status = GeneralStatus::Failed;
        record.error = Some(err);
        self.persist(record).await
    }

    /// Cooperative cancellation check. If the task_id is on the kill list
    /// it is removed (consume-once) and the job fails with `Cancelled`.
    pub async fn check_not_killed(&self, task_id: &str) -> Result<()> {
        if self.store.consume_kill(task_id).await? {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Request cancellation of a running job. A kill aimed at a job that
    /// already reached a terminal state is dropped; nothing will ever
    /// consume it, and the list would otherwise only grow.
    pub async fn kill(&self, task_id: &str) -> Result<()> {
        if let Some(record) = self.fetch(task_id).await? {
            if record.is_terminal() {
                return Ok(());
            }
        }
        self.store.add_kill(task_id).await?;
        Ok(())
    }

    /// Fetch a record by task_id.
    pub async fn fetch(&self, task_id: &str) -> Result<Option<JobRecord>> {
        match self.store.get(&task_key(task_id)).await? {
            Some(raw) => {
                let record = serde_json::from_str(&raw).map_err(StoreError::Serialization)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, record: &JobRecord) -> Result<()> {
        let raw = serde_json::to_string(record).map_err(StoreError::Serialization)?;
        self.store.set(&task_key(&record.task_id), &raw).await?;
        Ok(())
    }
}
