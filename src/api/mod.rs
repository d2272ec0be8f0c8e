//! HTTP surface: routing, shared state, and SSE framing.

pub mod chatbot;
pub mod chatdoc;
pub mod queue;
pub mod sse;
pub mod state;

pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

/// Build the service router.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/chatbot/chat", post(chatbot::chat))
        .route("/chatbot/chat-vision", post(chatbot::chat_vision))
        .route("/chatbot/stores", get(chatbot::list_stores))
        .route("/chatdoc/embed/queue", post(chatdoc::embed_queue))
        .route("/chatdoc/lc", post(chatdoc::lc_chat))
        .route(
            "/queue/{task_id}",
            get(queue::poll_task).delete(queue::revoke_task),
        )
        .route("/healthcheck", get(queue::healthcheck))
        .route("/healthcheck/queue", post(queue::healthcheck_queue))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
