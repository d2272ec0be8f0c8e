//! Job record schema.
//!
//! One record per submitted background task, persisted as JSON in the
//! record store and polled by clients via `GET /queue/{task_id}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorBody;

/// Outer envelope status: was the record itself writable/valid. This is
/// deliberately decoupled from job outcome, which lives in `TaskStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeneralStatus {
    Pending,
    Success,
    Failed,
}

/// Actual job progress, written only by the owning worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Started,
    Success,
    Failed,
}

/// Composite status slot of a job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub general_status: GeneralStatus,
    pub task_status: Option<TaskStatus>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            general_status: GeneralStatus::Pending,
            task_status: None,
        }
    }
}

/// String-encoded epoch-second timestamps. `end_generate` stays null until
/// the record is terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTime {
    pub start_generate: Option<String>,
    pub end_generate: Option<String>,
}

/// One background job, keyed by `task_id` in the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub task_id: String,
    pub status: JobStatus,
    pub time: JobTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl JobRecord {
    /// Allocate a fresh record in the PENDING state.
    ///
    /// The task_id is a v5 UUID over the OID namespace from the worker name
    /// plus a microsecond timestamp. Collision-free for practical purposes;
    /// callers must not assume monotonicity across processes.
    pub fn new(worker_name: &str, now: DateTime<Utc>) -> Self {
        let stamp = now.format("%Y%m%d%H%M%S%6f").to_string();
        let task_id =
            Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{worker_name}_{stamp}").as_bytes())
                .to_string();
        Self {
            task_id,
            status: JobStatus::default(),
            time: JobTime {
                start_generate: Some(epoch_string(now)),
                end_generate: None,
            },
            queue: None,
            task_result: None,
            error: None,
        }
    }

    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.task_status,
            Some(TaskStatus::Success) | Some(TaskStatus::Failed)
        )
    }
}

/// Immediate response body for queue submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponse {
    pub status: String,
    pub time: DateTime<Utc>,
    pub task_id: String,
}

impl QueueResponse {
    pub fn pending(time: DateTime<Utc>, task_id: String) -> Self {
        Self {
            status: "PENDING".to_string(),
            time,
            task_id,
        }
    }
}

/// Epoch seconds with fractional part, string-encoded as on the wire.
pub fn epoch_string(t: DateTime<Utc>) -> String {
    format!(
        "{}.{:06}",
        t.timestamp(),
        t.timestamp_subsec_micros() % 1_000_000
    )
}
