//! Search-check prompt state machine.
//!
//! Decides, from the running conversation minus the system message, whether
//! live web context is needed; if so performs the search, scrapes the
//! result pages, and rewrites the last user message with the retrieved
//! text. Explicit two-part shape: the caller drains the returned events,
//! then continues with the mutated session.

use std::sync::Arc;

use serde::Deserialize;

use crate::chat::session::ChatSession;
use crate::chat::stream::StreamEvent;
use crate::chat::{ChatMessage, Role, prompts};
use crate::error::{Result, UpstreamError};
use crate::llm::{ChatCompletionClient, CompletionRequest, TokenUsage};
use crate::search::WebSearch;

/// Model used for the classification round trip. One extra backend call per
/// chat request; a deliberate latency/feature trade-off.
const CLASSIFIER_MODEL: &str = "gpt-4o-mini";
const CLASSIFIER_TEMPERATURE: f32 = 0.7;

/// Generation temperature forced once search context is injected.
const SEARCH_CHAT_TEMPERATURE: f32 = 0.5;

fn default_num_link() -> u32 {
    3
}

/// Normalized search request extracted by the classifier. `query` never
/// carries a date fragment; dates live in `time` as dd/mm/yyyy with day or
/// month possibly empty.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub language: String,
    pub query: String,
    #[serde(default)]
    pub time: String,
    #[serde(default = "default_num_link")]
    pub num_link: u32,
}

/// Raw classifier output: `request` is `{}` when `web_browser_mode` is
/// false, so it is kept loose here and parsed strictly only when needed.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchDecision {
    pub web_browser_mode: bool,
    #[serde(default)]
    pub request: serde_json::Value,
}

impl SearchDecision {
    pub fn request(&self) -> std::result::Result<SearchRequest, UpstreamError> {
        serde_json::from_value(self.request.clone()).map_err(|e| {
            UpstreamError::MalformedLlmOutput(format!("search request payload: {e}"))
        })
    }
}

/// What the search phase produced: the events to emit (in order, before
/// anything else), the search-step metadata, and whether a search ran. The
/// session passed in has already been mutated when `performed` is true.
#[derive(Debug)]
pub struct SearchOutcome {
    pub events: Vec<StreamEvent>,
    pub metadata: serde_json::Value,
    /// Tokens spent on the classification round trip, reported again in the
    /// final chat metadata as `search_tokens`.
    pub usage: TokenUsage,
    pub performed: bool,
}

/// Run the search-check classifier and, when it asks for web context,
/// the search-and-rewrite sub-flow.
pub async fn decide_and_search(
    classifier: &Arc<dyn ChatCompletionClient>,
    search: &Arc<dyn WebSearch>,
    session: &mut ChatSession,
) -> Result<SearchOutcome> {
    let decision_input = serialize_history(session.history());
    let messages = vec![
        ChatMessage::text(Role::System, prompts::search_check_prompt()),
        ChatMessage::text(
            Role::User,
            format!("Check mode with user query input is: \n{decision_input}\n"),
        ),
    ];

    let completion = classifier
        .complete(CompletionRequest {
            model: CLASSIFIER_MODEL.to_string(),
            messages,
            temperature: CLASSIFIER_TEMPERATURE,
            max_tokens: None,
            json_mode: true,
        })
        .await?;

    // Malformed JSON here is a hard failure of the whole chat request.
    let decision: SearchDecision = serde_json::from_str(&completion.content)
        .map_err(|e| UpstreamError::MalformedLlmOutput(format!("search decision: {e}")))?;
    tracing::info!(web_browser_mode = decision.web_browser_mode, "search check");

    let metadata = serde_json::json!({
        "task": "generate_prompt",
        "model": CLASSIFIER_MODEL,
        "usage": {
            "input_tokens": completion.usage.input_tokens,
            "output_tokens": completion.usage.output_tokens,
        },
    });

    if !decision.web_browser_mode {
        return Ok(SearchOutcome {
            events: Vec::new(),
            metadata,
            usage: completion.usage,
            performed: false,
        });
    }

    let request = decision.request()?;
    session.model_mut().temperature = SEARCH_CHAT_TEMPERATURE;

    let question = format!("{} {}", request.query, request.time)
        .trim()
        .to_string();
    let urls = search.search(&question, request.num_link).await?;
    let texts = search.scrape(&urls).await;

    let rewritten = prompts::web_context_prompt(&session.last_user_text(), &urls, &texts);
    session.inject_into_last(rewritten);

    Ok(SearchOutcome {
        events: vec![
            StreamEvent::Searching,
            StreamEvent::Searched { urls },
        ],
        metadata,
        usage: completion.usage,
        performed: true,
    })
}

/// One JSON object per line, the classifier's view of the conversation.
fn serialize_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            serde_json::to_string(m).unwrap_or_else(|_| String::from("{}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
