//! Chat endpoints: plain chat with optional web search, and vision chat.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::info;

use crate::api::sse::sse_response;
use crate::api::state::AppState;
use crate::chat::{
    ChatModelRequest, ChatSession, IncomingMessage, PipelineMode, chat_event_stream,
    is_known_store, store_names, validate_image_parts, validate_messages,
};
use crate::error::{ApiError, ValidationError};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
    pub chat_model: ChatModelRequest,
    /// Optional preset prompt store to seed the system message from.
    #[serde(default)]
    pub store_name: Option<String>,
}

/// POST /chatbot/chat — search-checked streaming chat.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = build_session(&request)?;
    info!(
        platform = session.model().platform.as_str(),
        model = %session.model().model_name,
        "chat stream opened"
    );
    let deps = state.pipeline_deps(session.model().platform);
    let events = chat_event_stream(deps, session, PipelineMode::SearchCheck);
    Ok(sse_response(events, state.config.retry_timeout_ms))
}

/// POST /chatbot/chat-vision — streaming chat over mixed text/image
/// messages. Same phased stream as plain chat; image parts flatten to
/// their text parts for the search-check classifier.
pub async fn chat_vision(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = build_session(&request)?;
    validate_image_parts(session.messages())?;
    info!(
        model = %session.model().model_name,
        "vision chat stream opened"
    );
    let deps = state.pipeline_deps(session.model().platform);
    let events = chat_event_stream(deps, session, PipelineMode::SearchCheck);
    Ok(sse_response(events, state.config.retry_timeout_ms))
}

/// GET /chatbot/stores — preset prompt stores selectable via `store_name`.
pub async fn list_stores() -> impl IntoResponse {
    Json(serde_json::json!({ "store_names": store_names() }))
}

fn build_session(request: &ChatRequest) -> Result<ChatSession, ApiError> {
    let model = request.chat_model.validate()?;
    let messages = validate_messages(&request.messages)?;
    // An empty store_name means "no preset", not an invalid one.
    let store_name = request
        .store_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if let Some(name) = store_name {
        if !is_known_store(name) {
            return Err(ValidationError::InvalidStoreName(name.to_string()).into());
        }
    }
    let session = ChatSession::new(messages, model, store_name, false)?;
    Ok(session)
}
