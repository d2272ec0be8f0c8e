//! Task dispatcher.
//!
//! Submission hands a serialized payload to a named task on a fixed worker
//! queue. The contract the backend must honor: late acknowledgement (a task
//! counts as delivered only once its handler returns), prefetch of one task
//! per worker so a long document job cannot block behind others on the same
//! process, a soft wall-clock limit that surfaces as a catchable failure
//! inside the task, and a slightly larger hard limit that drops the task
//! future without further record writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{Error, ErrorBody, QueueError};
use crate::queue::lifecycle::TaskLifecycle;
use crate::queue::record::JobRecord;

/// Operations the worker registers handlers for. The task name on the wire
/// is `{worker_name}.{operation}` verbatim; no reflection-derived naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    EmbedDoc,
    HealthCheck,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbedDoc => "embed_doc",
            Self::HealthCheck => "healthcheck",
        }
    }

    /// Full task name under which the worker side registers its handler.
    pub fn task_name(&self, worker_name: &str) -> String {
        format!("{worker_name}.{}", self.as_str())
    }
}

/// Serialized submission payload.
#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub task_id: String,
    /// Serialized `JobRecord` at submission time.
    pub data: String,
    /// Task-specific request, if any.
    pub request: Option<String>,
}

/// Queue backend seam. The production deployment can sit a real broker
/// behind this; `LocalQueue` is the in-process implementation.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, task_name: &str, payload: TaskPayload) -> Result<(), QueueError>;
}

/// Context handed to a task handler.
pub struct TaskContext {
    pub task_id: String,
    pub request: Option<serde_json::Value>,
    pub lifecycle: TaskLifecycle,
}

/// One registered background task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task body. Lifecycle bookkeeping (STARTED, terminal
    /// writes, kill check on entry) is done by the worker loop; handlers
    /// only need additional `check_not_killed` calls around expensive work.
    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, Error>;
}

struct QueuedTask {
    task_name: String,
    payload: TaskPayload,
}

/// In-process queue backend: a bounded channel drained by a single worker
/// loop, one task in flight at a time.
pub struct LocalQueue {
    tx: mpsc::Sender<QueuedTask>,
}

impl LocalQueue {
    /// Spawn the worker loop and return the submit handle.
    pub fn start(
        handlers: HashMap<String, Arc<dyn TaskHandler>>,
        lifecycle: TaskLifecycle,
        soft_time_limit: Duration,
        hard_grace: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(worker_loop(
            rx,
            handlers,
            lifecycle,
            soft_time_limit,
            hard_grace,
        ));
        Self { tx }
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    async fn submit(&self, task_name: &str, payload: TaskPayload) -> Result<(), QueueError> {
        self.tx
            .send(QueuedTask {
                task_name: task_name.to_string(),
                payload,
            })
            .await
            .map_err(|_| QueueError::BrokerUnreachable("worker queue closed".to_string()))
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<QueuedTask>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    lifecycle: TaskLifecycle,
    soft_time_limit: Duration,
    hard_grace: Duration,
) {
    while let Some(task) = rx.recv().await {
        let task_id = task.payload.task_id.clone();
        let Some(handler) = handlers.get(&task.task_name) else {
            error!(task = %task.task_name, %task_id, "no handler registered");
            continue;
        };

        let hard_limit = soft_time_limit + hard_grace;
        let run = execute_task(
            handler.clone(),
            task,
            lifecycle.clone(),
            soft_time_limit,
        );
        // Hard limit: the task future is dropped outright. The record stays
        // non-terminal from the client's point of view; a documented gap.
        if tokio::time::timeout(hard_limit, run).await.is_err() {
            error!(%task_id, "hard time limit hit, task dropped without terminal write");
        }
    }
}

async fn execute_task(
    handler: Arc<dyn TaskHandler>,
    task: QueuedTask,
    lifecycle: TaskLifecycle,
    soft_time_limit: Duration,
) {
    let task_id = task.payload.task_id.clone();
    info!(task = %task.task_name, %task_id, "task started");

    let mut record: JobRecord = match serde_json::from_str(&task.payload.data) {
        Ok(r) => r,
        Err(e) => {
            error!(%task_id, error = %e, "undecodable job record, dropping task");
            return;
        }
    };
    // A failed final write leaves the record permanently non-terminal for
    // the client; all we can do at this level is log it.
    if let Err(e) = lifecycle.mark_started(&mut record).await {
        error!(%task_id, error = %e, "failed to persist STARTED");
        return;
    }

    let request: Option<serde_json::Value> = match task.payload.request.as_deref() {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(%task_id, error = %e, "undecodable task request");
                let body = ErrorBody::bad_request(format!("Invalid task request: {e}"));
                if let Err(e) = lifecycle.mark_failed(&mut record, body).await {
                    error!(%task_id, error = %e, "failed to persist terminal state");
                }
                return;
            }
        },
        None => None,
    };

    let ctx = TaskContext {
        task_id: task_id.clone(),
        request,
        lifecycle: lifecycle.clone(),
    };

    let outcome = async {
        ctx.lifecycle.check_not_killed(&ctx.task_id).await?;
        handler.run(&ctx).await
    };

    let write = match tokio::time::timeout(soft_time_limit, outcome).await {
        Ok(Ok(result)) => lifecycle.mark_succeeded(&mut record, result).await,
        Ok(Err(e)) => {
            warn!(%task_id, error = %e, "task failed");
            lifecycle
                .mark_failed(&mut record, ErrorBody::for_job_failure(&e))
                .await
        }
        Err(_) => {
            warn!(%task_id, "soft time limit exceeded");
            let e = Error::Queue(QueueError::SoftTimeLimitExceeded);
            lifecycle
                .mark_failed(&mut record, ErrorBody::for_job_failure(&e))
                .await
        }
    };
    if let Err(e) = write {
        error!(%task_id, error = %e, "failed to persist terminal state");
    }
}
