//! OpenAI-compatible HTTP client.
//!
//! Covers both the hosted OpenAI API and local OpenAI-compatible servers
//! (`local` platform). Streaming responses are parsed line-by-line off the
//! SSE body; usage is requested with `stream_options.include_usage` so the
//! final chunk carries backend-reported token counts.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::ChatMessage;
use crate::error::UpstreamError;
use crate::llm::{
    ChatCompletionClient, Completion, CompletionRequest, CompletionStream, StreamChunk, TokenUsage,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiClient {
    /// Client for the hosted OpenAI API.
    pub fn openai(http: reqwest::Client, api_key: SecretString) -> Self {
        Self {
            http,
            base_url: "https://api.openai.com".to_string(),
            api_key,
        }
    }

    /// Client for a local OpenAI-compatible server.
    pub fn local(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: SecretString::from(""),
        }
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": request.messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }
        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Llm(format!(
                "chat completions returned {status}: {body}"
            )));
        }
        Ok(resp)
    }
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageBody,
}

#[derive(Deserialize)]
struct MessageBody {
    content: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct UsageBody {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl From<UsageBody> for TokenUsage {
    fn from(u: UsageBody) -> Self {
        Self {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }
    }
}

#[async_trait]
impl ChatCompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, UpstreamError> {
        let resp = self.post(&self.body(&request, false)).await?;
        let parsed: CompletionResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Llm("completion had no choices".to_string()))?;
        Ok(Completion {
            content,
            usage: parsed.usage.map(Into::into).unwrap_or_default(),
        })
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, UpstreamError> {
        let resp = self.post(&self.body(&request, true)).await?;
        let stream = stream_lines(resp.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(stream))
    }
}

/// Parse one SSE line of a streamed completion. Returns:
/// - `Some(Ok(StreamChunk::Delta))` for content fragments
/// - `Some(Ok(StreamChunk::Usage))` for the final usage chunk
/// - `None` to skip (empty lines, `[DONE]`, role-only chunks)
fn parse_stream_line(line: &str) -> Option<Result<StreamChunk, UpstreamError>> {
    let data = line.trim().strip_prefix("data: ")?.trim();
    if data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamResponseChunk>(data) {
        Ok(chunk) => {
            if let Some(usage) = chunk.usage {
                return Some(Ok(StreamChunk::Usage(usage.into())));
            }
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(StreamChunk::Delta(content)))
        }
        Err(e) => Some(Err(UpstreamError::Llm(format!(
            "failed to parse stream chunk: {e}"
        )))),
    }
}

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String, UpstreamError>> + Send {
    futures::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((Err(UpstreamError::Http(e)), (stream, buffer)));
                    }
                    None => {
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
