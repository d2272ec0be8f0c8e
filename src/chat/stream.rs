//! Stream multiplexer.
//!
//! Turns the multi-phase chat operation into one ordered sequence of named
//! events over a single long-lived connection:
//!
//! ```text
//! INIT -> [SEARCH_CHECK] -> (SEARCHING -> SEARCHED)? -> METADATA(search)
//!      -> CHATTING* -> METADATA(chat) -> DONE
//! ```
//!
//! The pipeline runs on a spawned task feeding a bounded channel; the HTTP
//! layer drains the receiver into SSE frames. When the client disconnects
//! the receiver is dropped, sends fail, and the pipeline stops at its
//! current suspension point without requesting further upstream chunks.
//! Mid-stream failures emit a terminal `ERROR` event carrying the same
//! `{code, message}` shape as failed job records.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::search_mode::decide_and_search;
use crate::chat::session::ChatSession;
use crate::error::{Error, ErrorBody, Result};
use crate::llm::{ChatCompletionClient, CompletionRequest, StreamChunk, TokenUsage};
use crate::search::WebSearch;

/// Wire sentinel replacing literal newlines in CHATTING fragments. The
/// event framing is line-oriented; clients reverse the substitution.
pub const NEWLINE_SENTINEL: &str = "<!<newline>!>";

pub fn encode_newlines(fragment: &str) -> String {
    fragment.replace('\n', NEWLINE_SENTINEL)
}

pub fn decode_newlines(fragment: &str) -> String {
    fragment.replace(NEWLINE_SENTINEL, "\n")
}

/// One event of the chat stream, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Searching,
    Searched { urls: Vec<String> },
    /// Incremental text fragment, newline-encoded.
    Chatting { fragment: String },
    Metadata { payload: serde_json::Value },
    Done,
    /// Terminal failure event; nothing follows it.
    Error { body: ErrorBody },
}

impl StreamEvent {
    /// Phase tag carried in the SSE `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Searching => "SEARCHING",
            Self::Searched { .. } => "SEARCHED",
            Self::Chatting { .. } => "CHATTING",
            Self::Metadata { .. } => "METADATA",
            Self::Done => "DONE",
            Self::Error { .. } => "ERROR",
        }
    }

    /// Payload carried in the SSE `data` field: plain string for streaming
    /// fragments, JSON-encoded string for structured payloads.
    pub fn data(&self) -> String {
        match self {
            Self::Searching | Self::Done => String::new(),
            Self::Searched { urls } => {
                serde_json::to_string(urls).unwrap_or_else(|_| "[]".to_string())
            }
            Self::Chatting { fragment } => fragment.clone(),
            Self::Metadata { payload } => payload.to_string(),
            Self::Error { body } => {
                serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }
}

/// Collaborators the chat pipeline talks to.
#[derive(Clone)]
pub struct ChatPipelineDeps {
    /// Platform-selected backend for the CHATTING phase.
    pub llm: Arc<dyn ChatCompletionClient>,
    /// Backend for the one-shot search-check classification.
    pub classifier: Arc<dyn ChatCompletionClient>,
    pub search: Arc<dyn WebSearch>,
}

/// Which sub-flow runs before generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Run the search-check classifier, optionally search-and-rewrite.
    SearchCheck,
    /// Content was already injected (document chat); go straight to
    /// generation.
    Injected,
}

/// Spawn the pipeline and return the ordered event stream.
pub fn chat_event_stream(
    deps: ChatPipelineDeps,
    session: ChatSession,
    mode: PipelineMode,
) -> ReceiverStream<StreamEvent> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        if let Err(err) = run_pipeline(deps, session, mode, &tx).await {
            tracing::error!(error = %err, "chat pipeline failed mid-stream");
            let body = match &err {
                Error::Validation(e) => ErrorBody::bad_request(e.to_string()),
                _ => ErrorBody::internal(),
            };
            let _ = tx.send(StreamEvent::Error { body }).await;
        }
    });
    ReceiverStream::new(rx)
}

async fn run_pipeline(
    deps: ChatPipelineDeps,
    mut session: ChatSession,
    mode: PipelineMode,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<()> {
    // Phase: search check. Events are drained in order before generation;
    // the session is already mutated when a search ran.
    let mut search_usage = TokenUsage::default();
    if mode == PipelineMode::SearchCheck {
        let outcome = decide_and_search(&deps.classifier, &deps.search, &mut session).await?;
        search_usage = outcome.usage;
        for event in outcome.events {
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
        let metadata = StreamEvent::Metadata {
            payload: outcome.metadata,
        };
        if tx.send(metadata).await.is_err() {
            return Ok(());
        }
    }

    // Phase: generation.
    let model = session.model().clone();
    let mut stream = deps
        .llm
        .complete_stream(CompletionRequest {
            model: model.model_name.clone(),
            messages: session.messages().to_vec(),
            temperature: model.temperature,
            max_tokens: Some(model.max_tokens),
            json_mode: false,
        })
        .await?;

    let mut answer = String::new();
    let mut usage = TokenUsage::default();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Delta(fragment) => {
                answer.push_str(&fragment);
                let event = StreamEvent::Chatting {
                    fragment: encode_newlines(&fragment),
                };
                if tx.send(event).await.is_err() {
                    // Client gone: stop consuming the upstream stream.
                    return Ok(());
                }
            }
            StreamChunk::Usage(reported) => usage = reported,
        }
    }

    // Phase: final metadata + DONE.
    let metadata = serde_json::json!({
        "platform": model.platform.as_str(),
        "model": model.model_name,
        "temperature": model.temperature,
        "max_tokens": model.max_tokens,
        "input": session.prompt_echo(),
        "output": answer,
        "usage": {
            "input_tokens": usage.input_tokens,
            "output_tokens": usage.output_tokens,
            "search_tokens": search_usage.input_tokens + search_usage.output_tokens,
        },
    });
    if tx
        .send(StreamEvent::Metadata { payload: metadata })
        .await
        .is_err()
    {
        return Ok(());
    }
    let _ = tx.send(StreamEvent::Done).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::ChatModelRequest;
    use crate::chat::session::{ChatMessage, Role};
    use crate::error::UpstreamError;
    use crate::llm::{Completion, CompletionStream};
    use async_trait::async_trait;

    #[test]
    fn newline_sentinel_roundtrip() {
        let original = "line one\nline two\n\nend";
        let encoded = encode_newlines(original);
        assert!(!encoded.contains('\n'));
        assert_eq!(encoded, "line one<!<newline>!>line two<!<newline>!><!<newline>!>end");
        assert_eq!(decode_newlines(&encoded), original);
    }

    #[test]
    fn fragment_without_newlines_is_unchanged() {
        assert_eq!(encode_newlines("plain"), "plain");
    }

    struct StubLlm {
        decision: String,
        fragments: Vec<String>,
    }

    #[async_trait]
    impl ChatCompletionClient for StubLlm {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<Completion, UpstreamError> {
            Ok(Completion {
                content: self.decision.clone(),
                usage: TokenUsage::default(),
            })
        }

        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionStream, UpstreamError> {
            let chunks: Vec<std::result::Result<StreamChunk, UpstreamError>> = self
                .fragments
                .iter()
                .cloned()
                .map(|f| Ok(StreamChunk::Delta(f)))
                .chain(std::iter::once(Ok(StreamChunk::Usage(TokenUsage {
                    input_tokens: 11,
                    output_tokens: 4,
                }))))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct NoSearch;

    #[async_trait]
    impl WebSearch for NoSearch {
        async fn search(
            &self,
            _query: &str,
            _num_links: u32,
        ) -> std::result::Result<Vec<String>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn fetch_page_text(&self, _url: &str) -> std::result::Result<String, UpstreamError> {
            Ok(String::new())
        }
    }

    fn session() -> ChatSession {
        let model = ChatModelRequest {
            platform: "OpenAI".to_string(),
            model_name: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
        }
        .validate()
        .unwrap();
        ChatSession::new(
            vec![ChatMessage::text(Role::User, "hello")],
            model,
            None,
            false,
        )
        .unwrap()
    }

    fn deps(decision: &str, fragments: &[&str]) -> ChatPipelineDeps {
        let llm = Arc::new(StubLlm {
            decision: decision.to_string(),
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
        });
        ChatPipelineDeps {
            llm: llm.clone(),
            classifier: llm,
            search: Arc::new(NoSearch),
        }
    }

    #[tokio::test]
    async fn no_search_stream_has_canonical_order() {
        let deps = deps(
            r#"{"web_browser_mode": false, "request": {}}"#,
            &["Hello\nworld", "!"],
        );
        let events: Vec<StreamEvent> =
            chat_event_stream(deps, session(), PipelineMode::SearchCheck)
                .collect()
                .await;

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["METADATA", "CHATTING", "CHATTING", "METADATA", "DONE"]
        );

        // Fragments are sentinel-encoded on the wire.
        let StreamEvent::Chatting { fragment } = &events[1] else {
            panic!("expected CHATTING");
        };
        assert_eq!(fragment, "Hello<!<newline>!>world");

        // Final metadata echoes the answer with real newlines and reported usage.
        let StreamEvent::Metadata { payload } = &events[3] else {
            panic!("expected METADATA");
        };
        assert_eq!(payload["output"], "Hello\nworld!");
        assert_eq!(payload["usage"]["input_tokens"], 11);
        assert_eq!(payload["usage"]["search_tokens"], 0);
    }

    #[tokio::test]
    async fn injected_mode_skips_search_check() {
        let deps = deps("never used", &["answer"]);
        let events: Vec<StreamEvent> =
            chat_event_stream(deps, session(), PipelineMode::Injected)
                .collect()
                .await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["CHATTING", "METADATA", "DONE"]);
    }

    #[tokio::test]
    async fn malformed_decision_emits_terminal_error() {
        let deps = deps("not json", &["unused"]);
        let events: Vec<StreamEvent> =
            chat_event_stream(deps, session(), PipelineMode::SearchCheck)
                .collect()
                .await;
        assert_eq!(events.len(), 1);
        let StreamEvent::Error { body } = &events[0] else {
            panic!("expected ERROR");
        };
        assert_eq!(body.code, "500");
        assert_eq!(body.message, "Internal Server Error");
    }
}
