//! Background task handlers registered with the worker.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, UpstreamError, ValidationError};
use crate::ingest::partition::{Block, blocks_to_markdown, chunk_blocks, clean_text};
use crate::ingest::DocumentPartitioner;
use crate::queue::dispatch::{Operation, TaskContext, TaskHandler};
use crate::search::html_to_text;
use crate::store::{RecordStore, doc_key};

/// Character budget for retrieval chunks.
const CHUNK_MAX_CHARS: usize = 1000;

/// How the embedded document will be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// Whole-document prompting: content is joined markdown.
    Lc,
    /// Retrieval: content is a list of bounded chunks.
    Rag,
}

#[derive(Debug, Deserialize)]
struct EmbedRequest {
    chat_type: ChatType,
    #[serde(default)]
    files_path: Vec<String>,
    #[serde(default)]
    web_urls: Vec<String>,
}

/// Parses staged files and web pages into stored document content.
pub struct EmbedDocTask {
    store: Arc<dyn RecordStore>,
    partitioner: Arc<dyn DocumentPartitioner>,
    http: reqwest::Client,
}

impl EmbedDocTask {
    pub fn new(
        store: Arc<dyn RecordStore>,
        partitioner: Arc<dyn DocumentPartitioner>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            store,
            partitioner,
            http,
        }
    }

    async fn fetch_web_blocks(&self, url: &str) -> Result<Vec<Block>, UpstreamError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(UpstreamError::Download(format!(
                "{url} returned {}",
                resp.status()
            )));
        }
        let text = clean_text(&html_to_text(&resp.text().await?));
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Block::text(text)])
    }
}

#[async_trait]
impl TaskHandler for EmbedDocTask {
    async fn run(&self, ctx: &TaskContext) -> Result<Value, Error> {
        let request = ctx
            .request
            .clone()
            .ok_or_else(|| ValidationError::Other("Missing embed request".to_string()))?;
        let embed: EmbedRequest = serde_json::from_value(request.clone())
            .map_err(|e| ValidationError::Other(format!("Invalid embed request: {e}")))?;

        let mut content: Vec<String> = Vec::new();

        for path in &embed.files_path {
            ctx.lifecycle.check_not_killed(&ctx.task_id).await?;
            let path = PathBuf::from(path);
            let blocks = self
                .partitioner
                .partition_file(&path)
                .await
                .map_err(Error::Upstream)?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string());
            content.extend(render(&embed.chat_type, &source, &blocks));
        }

        for url in &embed.web_urls {
            ctx.lifecycle.check_not_killed(&ctx.task_id).await?;
            match self.fetch_web_blocks(url).await {
                Ok(blocks) => content.extend(render(&embed.chat_type, url, &blocks)),
                Err(e) => warn!(%url, error = %e, "skipping unreadable web url"),
            }
        }

        if content.is_empty() {
            return Err(Error::Upstream(UpstreamError::Partition(
                "no readable content in submitted files or urls".to_string(),
            )));
        }

        let data_id = Uuid::new_v4().simple().to_string();
        let body = json!({
            "chat_type": embed.chat_type_str(),
            "content": content,
        });
        self.store
            .set(&doc_key(&data_id), &body.to_string())
            .await
            .map_err(Error::Store)?;
        info!(task_id = %ctx.task_id, %data_id, parts = content.len(), "document embedded");

        Ok(json!({
            "data_id": data_id,
            "metadata": {
                "task": Operation::EmbedDoc.as_str(),
                "request": request,
            },
        }))
    }
}

impl EmbedRequest {
    fn chat_type_str(&self) -> &'static str {
        match self.chat_type {
            ChatType::Lc => "lc",
            ChatType::Rag => "rag",
        }
    }
}

fn render(chat_type: &ChatType, source: &str, blocks: &[Block]) -> Vec<String> {
    match chat_type {
        ChatType::Lc => vec![blocks_to_markdown(source, blocks)],
        ChatType::Rag => chunk_blocks(blocks, CHUNK_MAX_CHARS),
    }
}

/// Round-trips through the full queue machinery so a poll proves the
/// worker is draining tasks.
pub struct HealthCheckTask;

#[async_trait]
impl TaskHandler for HealthCheckTask {
    async fn run(&self, _ctx: &TaskContext) -> Result<Value, Error> {
        Ok(json!({
            "data": { "healthcheck": true },
            "metadata": { "task": Operation::HealthCheck.as_str() },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::lifecycle::TaskLifecycle;
    use crate::store::MemoryStore;
    use std::path::Path;

    struct FixedPartitioner;

    #[async_trait]
    impl DocumentPartitioner for FixedPartitioner {
        async fn partition_file(&self, _path: &Path) -> Result<Vec<Block>, UpstreamError> {
            Ok(vec![Block::text("alpha"), Block::text("beta")])
        }
    }

    fn ctx(store: Arc<dyn RecordStore>, request: Value) -> TaskContext {
        TaskContext {
            task_id: "t1".to_string(),
            request: Some(request),
            lifecycle: TaskLifecycle::new(store, "worker_ai".to_string()),
        }
    }

    #[tokio::test]
    async fn embed_stores_document_and_returns_data_id() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let task = EmbedDocTask::new(
            store.clone(),
            Arc::new(FixedPartitioner),
            reqwest::Client::new(),
        );
        let request = json!({
            "chat_type": "lc",
            "files_path": ["/tmp/doc.txt"],
            "web_urls": [],
        });
        let result = task.run(&ctx(store.clone(), request)).await.unwrap();

        let data_id = result["data_id"].as_str().unwrap();
        let stored = store.get(&doc_key(data_id)).await.unwrap().unwrap();
        let body: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(body["chat_type"], "lc");
        assert!(body["content"][0].as_str().unwrap().contains("alpha"));
        assert_eq!(result["metadata"]["task"], "embed_doc");
    }

    #[tokio::test]
    async fn embed_rejects_malformed_request() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let task = EmbedDocTask::new(
            store.clone(),
            Arc::new(FixedPartitioner),
            reqwest::Client::new(),
        );
        let err = task
            .run(&ctx(store, json!({ "chat_type": "bogus" })))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn embed_stops_when_killed() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let lifecycle = TaskLifecycle::new(store.clone(), "worker_ai".to_string());
        lifecycle.kill("t1").await.unwrap();
        let task = EmbedDocTask::new(
            store.clone(),
            Arc::new(FixedPartitioner),
            reqwest::Client::new(),
        );
        let ctx = TaskContext {
            task_id: "t1".to_string(),
            request: Some(json!({ "chat_type": "lc", "files_path": ["/tmp/a.txt"] })),
            lifecycle,
        };
        let err = task.run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn healthcheck_reports_alive() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let result = HealthCheckTask
            .run(&ctx(store, json!({})))
            .await
            .unwrap();
        assert_eq!(result["data"]["healthcheck"], true);
        assert_eq!(result["metadata"]["task"], "healthcheck");
    }
}
