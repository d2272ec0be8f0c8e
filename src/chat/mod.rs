//! Chat domain — session model, model-config validation, preset prompt
//! store, the search-mode prompt state machine, and the SSE stream
//! multiplexer.

pub mod models;
pub mod prompts;
pub mod search_mode;
pub mod session;
pub mod stream;

pub use models::{ChatModelConfig, ChatModelRequest, Platform};
pub use prompts::{document_context_prompt, is_known_store, store_names};
pub use search_mode::{SearchDecision, SearchOutcome, decide_and_search};
pub use session::{
    ChatMessage, ChatSession, ContentPart, IncomingMessage, MessageContent, Role,
    validate_image_parts, validate_messages,
};
pub use stream::{
    ChatPipelineDeps, NEWLINE_SENTINEL, PipelineMode, StreamEvent, chat_event_stream,
    decode_newlines, encode_newlines,
};
