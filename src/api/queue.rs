//! Job polling, revocation, and health endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};

use crate::api::state::AppState;
use crate::error::{ApiError, ErrorBody};
use crate::queue::{Operation, QueueResponse, TaskPayload};

/// GET /queue/{task_id} — poll a job record.
pub async fn poll_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.lifecycle.fetch(&task_id).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                code: "404".to_string(),
                message: format!("Unknown task_id '{task_id}'."),
            }),
        )
            .into_response()),
    }
}

/// DELETE /queue/{task_id} — put a job on the kill list. The worker picks
/// it up at its next kill check and fails the record with "Task killed!".
pub async fn revoke_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.lifecycle.kill(&task_id).await?;
    info!(%task_id, "task revoked");
    Ok(Json(json!({ "task_id": task_id, "revoked": true })))
}

/// GET /healthcheck — liveness of the HTTP process.
pub async fn healthcheck() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /healthcheck/queue — submit a no-op task so a subsequent poll
/// proves the worker loop is draining the queue.
pub async fn healthcheck_queue(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let (created_at, mut record) = state.lifecycle.create().await?;
    let task_id = record.task_id.clone();

    let payload = TaskPayload {
        task_id: task_id.clone(),
        data: serde_json::to_string(&record).map_err(|_| ApiError::internal())?,
        request: None,
    };
    let task_name = Operation::HealthCheck.task_name(&state.config.worker_name);
    if let Err(e) = state.queue.submit(&task_name, payload).await {
        error!(%task_id, error = %e, "queue submission failed");
        state
            .lifecycle
            .mark_submit_failed(&mut record, ErrorBody::internal())
            .await?;
        return Err(ApiError::internal());
    }

    Ok(Json(QueueResponse::pending(created_at, task_id)))
}
