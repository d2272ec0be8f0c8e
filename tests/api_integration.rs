//! Integration tests for the HTTP surface.
//!
//! Each test spins up an Axum server on a random port with stubbed LLM
//! and search backends, then exercises the real REST / SSE contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use ragserve::api::{AppState, app_routes};
use ragserve::config::ServiceConfig;
use ragserve::error::UpstreamError;
use ragserve::ingest::TextPartitioner;
use ragserve::llm::{
    ChatCompletionClient, Completion, CompletionRequest, CompletionStream, StreamChunk, TokenUsage,
};
use ragserve::queue::{
    EmbedDocTask, HealthCheckTask, LocalQueue, Operation, TaskHandler, TaskLifecycle, TaskQueue,
};
use ragserve::search::WebSearch;
use ragserve::store::{MemoryStore, RecordStore};

/// LLM stub: classifier says "no search", generation streams two deltas.
struct StubLlm;

#[async_trait]
impl ChatCompletionClient for StubLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, UpstreamError> {
        assert!(request.json_mode, "only the classifier uses one-shot calls");
        Ok(Completion {
            content: json!({
                "web_browser_mode": false,
                "request": {"language": "en", "query": "", "time": "", "num_link": 3},
            })
            .to_string(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }

    async fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionStream, UpstreamError> {
        let chunks = vec![
            Ok(StreamChunk::Delta("Hello".to_string())),
            Ok(StreamChunk::Delta(" world\nbye".to_string())),
            Ok(StreamChunk::Usage(TokenUsage {
                input_tokens: 12,
                output_tokens: 2,
            })),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

struct StubSearch;

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, _query: &str, _num_links: u32) -> Result<Vec<String>, UpstreamError> {
        Ok(vec![])
    }

    async fn fetch_page_text(&self, _url: &str) -> Result<String, UpstreamError> {
        Ok(String::new())
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    _workdir: tempfile::TempDir,
}

async fn start_server() -> TestServer {
    let workdir = tempfile::tempdir().unwrap();
    let config = Arc::new(ServiceConfig {
        worker_directory: workdir.path().to_string_lossy().to_string(),
        ..ServiceConfig::default()
    });

    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let lifecycle = TaskLifecycle::new(store.clone(), config.worker_name.clone());
    let http = reqwest::Client::new();

    let mut handlers: HashMap<String, Arc<dyn TaskHandler>> = HashMap::new();
    handlers.insert(
        Operation::EmbedDoc.task_name(&config.worker_name),
        Arc::new(EmbedDocTask::new(
            store.clone(),
            Arc::new(TextPartitioner),
            http.clone(),
        )),
    );
    handlers.insert(
        Operation::HealthCheck.task_name(&config.worker_name),
        Arc::new(HealthCheckTask),
    );
    let queue: Arc<dyn TaskQueue> = Arc::new(LocalQueue::start(
        handlers,
        lifecycle.clone(),
        Duration::from_secs(30),
        Duration::from_secs(5),
    ));

    let stub: Arc<dyn ChatCompletionClient> = Arc::new(StubLlm);
    let state = AppState {
        config,
        store,
        lifecycle,
        queue,
        openai: stub.clone(),
        local: stub,
        search: Arc::new(StubSearch),
        http,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app_routes(state)).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        _workdir: workdir,
    }
}

fn chat_body(store_name: Option<&str>) -> Value {
    json!({
        "messages": [{"role": "user", "content": "What is Rust?"}],
        "chat_model": {
            "platform": "OpenAI",
            "model_name": "gpt-4o-mini",
            "temperature": 0.7,
            "max_tokens": 1024,
        },
        "store_name": store_name,
    })
}

/// Event names in emission order, from a raw SSE body.
fn event_names(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|l| l.strip_prefix("event: "))
        .collect()
}

/// Data payload of the first event with the given name.
fn event_data<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let mut lines = body.lines();
    while let Some(line) = lines.next() {
        if line.strip_prefix("event: ") == Some(name) {
            return lines.next().and_then(|l| l.strip_prefix("data: "));
        }
    }
    None
}

async fn poll_until_terminal(server: &TestServer, task_id: &str) -> Value {
    for _ in 0..100 {
        let record: Value = server
            .client
            .get(format!("{}/queue/{task_id}", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let task_status = record["status"]["task_status"].as_str().unwrap_or("");
        if task_status == "SUCCESS" || task_status == "FAILED" {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} never reached a terminal state");
}

#[tokio::test]
async fn embed_then_poll_then_document_chat() {
    let server = start_server().await;

    let form = reqwest::multipart::Form::new()
        .part(
            "files",
            reqwest::multipart::Part::bytes(b"Rust is a systems language.\n\nIt is fast.".to_vec())
                .file_name("notes.txt")
                .mime_str("text/plain")
                .unwrap(),
        )
        .text("chat_type", "lc");
    let resp = server
        .client
        .post(format!("{}/chatdoc/embed/queue", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let submitted: Value = resp.json().await.unwrap();
    assert_eq!(submitted["status"], "PENDING");
    let task_id = submitted["task_id"].as_str().unwrap().to_string();

    let record = poll_until_terminal(&server, &task_id).await;
    assert_eq!(record["status"]["general_status"], "SUCCESS");
    assert_eq!(record["status"]["task_status"], "SUCCESS");
    assert!(record["time"]["end_generate"].is_string());
    let data_id = record["task_result"]["data_id"].as_str().unwrap();
    assert_eq!(record["task_result"]["metadata"]["task"], "embed_doc");

    let mut body = chat_body(None);
    body["data_id"] = json!(data_id);
    let resp = server
        .client
        .post(format!("{}/chatdoc/lc", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    let names = event_names(&text);
    assert_eq!(names.first(), Some(&"CHATTING"));
    assert_eq!(names.last(), Some(&"DONE"));
    assert!(names.contains(&"METADATA"));
    assert!(!names.contains(&"SEARCHING"));
}

#[tokio::test]
async fn embed_without_files_or_urls_is_rejected() {
    let server = start_server().await;
    let form = reqwest::multipart::Form::new().text("chat_type", "rag");
    let resp = server
        .client
        .post(format!("{}/chatdoc/embed/queue", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "400");
    assert_eq!(
        body["message"],
        "Don't find your [files, urls]. Please check your input."
    );
}

#[tokio::test]
async fn embed_rejects_disallowed_file_type() {
    let server = start_server().await;
    let form = reqwest::multipart::Form::new().part(
        "files",
        reqwest::multipart::Part::bytes(b"MZ".to_vec())
            .file_name("tool.exe")
            .mime_str("application/octet-stream")
            .unwrap(),
    );
    let resp = server
        .client
        .post(format!("{}/chatdoc/embed/queue", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn chat_with_unknown_store_name_is_rejected() {
    let server = start_server().await;
    let resp = server
        .client
        .post(format!("{}/chatbot/chat", server.base))
        .json(&chat_body(Some("No Such Store")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Invalid store name 'No Such Store'.");
}

#[tokio::test]
async fn chat_stream_has_ordered_events_and_encoded_newlines() {
    let server = start_server().await;
    let resp = server
        .client
        .post(format!("{}/chatbot/chat", server.base))
        .json(&chat_body(None))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();

    let names = event_names(&text);
    assert_eq!(
        names,
        vec!["METADATA", "CHATTING", "CHATTING", "METADATA", "DONE"]
    );

    // Fragment newlines travel as the sentinel, not literal newlines.
    assert!(text.contains("<!<newline>!>"));

    let meta: Value =
        serde_json::from_str(event_data(&text, "METADATA").unwrap()).unwrap();
    assert_eq!(meta["task"], "generate_prompt");

    // All frames share one message id.
    let ids: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("id: "))
        .collect();
    assert!(ids.len() >= 5);
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert!(ids[0].starts_with("message_id_"));
}

#[tokio::test]
async fn final_metadata_reports_usage_and_echo() {
    let server = start_server().await;
    let resp = server
        .client
        .post(format!("{}/chatbot/chat", server.base))
        .json(&chat_body(None))
        .send()
        .await
        .unwrap();
    let text = resp.text().await.unwrap();

    let final_meta = text
        .lines()
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|w| w[0] == "event: METADATA")
        .filter_map(|w| w[1].strip_prefix("data: "))
        .last()
        .map(|d| serde_json::from_str::<Value>(d).unwrap())
        .unwrap();
    assert_eq!(final_meta["model"], "gpt-4o-mini");
    assert_eq!(final_meta["output"], "Hello world\nbye");
    assert_eq!(final_meta["usage"]["input_tokens"], 12);
    assert_eq!(final_meta["usage"]["output_tokens"], 2);
    // Classifier round-trip tokens are folded into the same usage block.
    assert_eq!(final_meta["usage"]["search_tokens"], 15);
}

#[tokio::test]
async fn document_chat_with_unknown_data_id_is_rejected_before_streaming() {
    let server = start_server().await;
    let mut body = chat_body(None);
    body["data_id"] = json!("deadbeef");
    let resp = server
        .client
        .post(format!("{}/chatdoc/lc", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Unknown data_id 'deadbeef'.");
}

#[tokio::test]
async fn vision_chat_rejects_oversized_or_malformed_images() {
    let server = start_server().await;
    let mut body = chat_body(None);
    body["messages"] = json!([{
        "role": "user",
        "content": [
            {"type": "text", "text": "what is this"},
            {"type": "image_url", "image_url": {"url": "data:image/webp;base64,AAAA"}},
        ],
    }]);
    let resp = server
        .client
        .post(format!("{}/chatbot/chat-vision", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn vision_chat_runs_the_search_check_phase() {
    let server = start_server().await;
    let mut body = chat_body(None);
    body["messages"] = json!([{
        "role": "user",
        "content": [
            {"type": "text", "text": "what is in this picture?"},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
        ],
    }]);
    let resp = server
        .client
        .post(format!("{}/chatbot/chat-vision", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();

    // Same phased stream as plain chat: the search-check metadata comes
    // first even when the classifier decides against searching.
    let names = event_names(&text);
    assert_eq!(
        names,
        vec!["METADATA", "CHATTING", "CHATTING", "METADATA", "DONE"]
    );
    let check_meta: Value =
        serde_json::from_str(event_data(&text, "METADATA").unwrap()).unwrap();
    assert_eq!(check_meta["task"], "generate_prompt");
}

#[tokio::test]
async fn empty_store_name_means_no_preset() {
    let server = start_server().await;
    let resp = server
        .client
        .post(format!("{}/chatbot/chat", server.base))
        .json(&chat_body(Some("")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(event_names(&text).ends_with(&["METADATA", "DONE"]));
}

#[tokio::test]
async fn healthcheck_endpoints() {
    let server = start_server().await;

    let resp = server
        .client
        .get(format!("{}/healthcheck", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = server
        .client
        .post(format!("{}/healthcheck/queue", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let submitted: Value = resp.json().await.unwrap();
    let task_id = submitted["task_id"].as_str().unwrap().to_string();

    let record = poll_until_terminal(&server, &task_id).await;
    assert_eq!(record["status"]["task_status"], "SUCCESS");
    assert_eq!(record["task_result"]["metadata"]["task"], "healthcheck");
}

#[tokio::test]
async fn polling_unknown_task_returns_404() {
    let server = start_server().await;
    let resp = server
        .client
        .get(format!("{}/queue/not-a-task", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn invalid_model_config_is_rejected() {
    let server = start_server().await;
    let mut body = chat_body(None);
    body["chat_model"]["temperature"] = json!(1.5);
    let resp = server
        .client
        .post(format!("{}/chatbot/chat", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    body["chat_model"]["temperature"] = json!(0.7);
    body["chat_model"]["platform"] = json!("azure");
    let resp = server
        .client
        .post(format!("{}/chatbot/chat", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert!(err["message"].as_str().unwrap().contains("azure"));
}
