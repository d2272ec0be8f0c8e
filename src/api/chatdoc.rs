//! Document endpoints: queued embedding of uploaded files/URLs and
//! whole-document streaming chat.

use axum::Json;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::api::sse::sse_response;
use crate::api::state::AppState;
use crate::chat::{
    ChatModelRequest, ChatSession, IncomingMessage, PipelineMode, chat_event_stream,
    document_context_prompt, validate_messages,
};
use crate::error::{ApiError, ValidationError};
use crate::ingest::{classify_urls, save_upload, save_url_file, validate_content_type};
use crate::queue::{Operation, QueueResponse, TaskPayload};
use crate::store::doc_key;

/// POST /chatdoc/embed/queue — stage uploads, classify URLs, and enqueue
/// the embedding job. Responds immediately with the PENDING record handle.
pub async fn embed_queue(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let dir = &state.config.worker_directory;
    let mut chat_type = "rag".to_string();
    let mut files_path: Vec<String> = Vec::new();
    let mut urls: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("files") => {
                let content_type = field.content_type().unwrap_or("").to_string();
                validate_content_type(&content_type)?;
                let name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable upload: {e}")))?;
                let path = save_upload(dir, &name, &bytes).await?;
                files_path.push(path.to_string_lossy().to_string());
            }
            Some("urls") => {
                let url = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable url field: {e}")))?;
                if !url.trim().is_empty() {
                    urls.push(url.trim().to_string());
                }
            }
            Some("chat_type") => {
                chat_type = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable chat_type: {e}")))?;
            }
            other => {
                warn!(field = ?other, "ignoring unknown multipart field");
            }
        }
    }

    let (file_urls, web_urls) = classify_urls(&urls);
    for url in &file_urls {
        let path = save_url_file(&state.http, dir, url).await?;
        files_path.push(path.to_string_lossy().to_string());
    }

    if files_path.is_empty() && web_urls.is_empty() {
        return Err(ValidationError::NoFilesOrUrls.into());
    }

    let (created_at, mut record) = state.lifecycle.create().await?;
    let task_id = record.task_id.clone();
    info!(%task_id, files = files_path.len(), urls = web_urls.len(), "embed job queued");

    let request = json!({
        "chat_type": chat_type,
        "files_path": files_path,
        "web_urls": web_urls,
    });
    let payload = TaskPayload {
        task_id: task_id.clone(),
        data: serde_json::to_string(&record).map_err(|_| ApiError::internal())?,
        request: Some(request.to_string()),
    };
    let task_name = Operation::EmbedDoc.task_name(&state.config.worker_name);
    if let Err(e) = state.queue.submit(&task_name, payload).await {
        error!(%task_id, error = %e, "queue submission failed");
        state
            .lifecycle
            .mark_submit_failed(&mut record, crate::error::ErrorBody::internal())
            .await?;
        return Err(ApiError::internal());
    }

    Ok(Json(QueueResponse::pending(created_at, task_id)))
}

#[derive(Debug, Deserialize)]
pub struct DocChatRequest {
    pub messages: Vec<IncomingMessage>,
    pub chat_model: ChatModelRequest,
    pub data_id: String,
}

#[derive(Debug, Deserialize)]
struct StoredDocument {
    content: Vec<String>,
}

/// POST /chatdoc/lc — stream chat over a previously embedded document.
/// The document is resolved before the stream opens so an unknown
/// `data_id` fails as a plain 400 rather than mid-stream.
pub async fn lc_chat(
    State(state): State<AppState>,
    Json(request): Json<DocChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = state
        .store
        .get(&doc_key(&request.data_id))
        .await?
        .ok_or_else(|| ValidationError::UnknownDataId(request.data_id.clone()))?;
    let document: StoredDocument = serde_json::from_str(&raw).map_err(|e| {
        error!(data_id = %request.data_id, error = %e, "corrupt stored document");
        ApiError::internal()
    })?;

    let model = request.chat_model.validate()?;
    let messages = validate_messages(&request.messages)?;
    let mut session = ChatSession::new(messages, model, None, true)?;
    let prompt = document_context_prompt(&session.last_user_text(), &document.content.join("\n\n"));
    session.inject_into_last(prompt);

    info!(data_id = %request.data_id, "document chat stream opened");
    let deps = state.pipeline_deps(session.model().platform);
    let events = chat_event_stream(deps, session, PipelineMode::Injected);
    Ok(sse_response(events, state.config.retry_timeout_ms))
}
