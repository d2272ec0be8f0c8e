//! Server-sent event framing for the chat stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::StreamEvent;

/// Event id shared by every frame of one response stream.
pub fn message_id(now: chrono::DateTime<Utc>) -> String {
    format!("message_id_{}", now.format("%Y%m%d%H%M%S%6f"))
}

/// Frame a pipeline event stream as SSE. Every frame carries the same
/// message id and the configured reconnect hint.
pub fn sse_response(
    events: ReceiverStream<StreamEvent>,
    retry_timeout_ms: u64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = message_id(Utc::now());
    let stream = events.map(move |event| {
        Ok(Event::default()
            .id(id.clone())
            .event(event.name())
            .data(event.data())
            .retry(Duration::from_millis(retry_timeout_ms)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
