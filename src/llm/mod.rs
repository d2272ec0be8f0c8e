//! Generation backend seam.
//!
//! The backend is an opaque streaming token source: one trait, two calls.
//! `complete` is the one-shot (optionally strict-JSON) request used by the
//! search-check classifier; `complete_stream` drives the CHATTING phase.
//! Token counting is delegated to the backend's reported usage.

pub mod openai;

pub use openai::OpenAiClient;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::error::UpstreamError;

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Parameters of one generation call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Request a strict-JSON response body from the backend.
    pub json_mode: bool,
}

/// A finished one-shot completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// One item of a streamed completion.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Incremental text fragment.
    Delta(String),
    /// Backend-reported usage, sent once at end of stream when available.
    Usage(TokenUsage),
}

pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<StreamChunk, UpstreamError>> + Send>>;

/// Opaque generation backend.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Single non-streamed completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, UpstreamError>;

    /// Streamed completion. The returned stream requests no further chunks
    /// once dropped, which is how client disconnects propagate upstream.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, UpstreamError>;
}
