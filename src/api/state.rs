//! Application state shared across HTTP handlers.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::chat::{ChatPipelineDeps, Platform};
use crate::config::ServiceConfig;
use crate::llm::ChatCompletionClient;
use crate::llm::openai::OpenAiClient;
use crate::queue::{TaskLifecycle, TaskQueue};
use crate::search::{GoogleSearchClient, WebSearch};
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub store: Arc<dyn RecordStore>,
    pub lifecycle: TaskLifecycle,
    pub queue: Arc<dyn TaskQueue>,
    pub openai: Arc<dyn ChatCompletionClient>,
    pub local: Arc<dyn ChatCompletionClient>,
    pub search: Arc<dyn WebSearch>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire up the default production clients.
    pub fn new(
        config: Arc<ServiceConfig>,
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        let http = reqwest::Client::new();
        let openai: Arc<dyn ChatCompletionClient> = Arc::new(OpenAiClient::openai(
            http.clone(),
            config.openai_api_key.expose_secret().to_string().into(),
        ));
        let local: Arc<dyn ChatCompletionClient> =
            Arc::new(OpenAiClient::local(http.clone(), config.llm_url.clone()));
        let search: Arc<dyn WebSearch> = Arc::new(GoogleSearchClient::new(
            http.clone(),
            config.google_api_key.expose_secret().to_string().into(),
            config.google_cse_id.clone(),
        ));
        let lifecycle = TaskLifecycle::new(store.clone(), config.worker_name.clone());
        Self {
            config,
            store,
            lifecycle,
            queue,
            openai,
            local,
            search,
            http,
        }
    }

    /// Backend serving the generation phase for a given platform.
    pub fn llm_for(&self, platform: Platform) -> Arc<dyn ChatCompletionClient> {
        match platform {
            Platform::OpenAi => self.openai.clone(),
            Platform::Local => self.local.clone(),
        }
    }

    /// Pipeline dependencies for a session on the given platform. The
    /// search-check classifier always runs on the OpenAI backend.
    pub fn pipeline_deps(&self, platform: Platform) -> ChatPipelineDeps {
        ChatPipelineDeps {
            llm: self.llm_for(platform),
            classifier: self.openai.clone(),
            search: self.search.clone(),
        }
    }
}
