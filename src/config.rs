//! Service configuration.

use std::time::Duration;

use secrecy::SecretString;

/// Configuration for the HTTP service and the worker queue.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind host for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Logical worker identifier. Queue name, task-name prefix and the
    /// task_id namespace all derive from it.
    pub worker_name: String,
    /// Reconnect hint (milliseconds) sent on every SSE event.
    pub retry_timeout_ms: u64,
    /// Soft time limit for queued tasks. Exceeding it raises a catchable
    /// cancellation inside the task so a clean FAILED record can be written.
    pub queue_soft_time_limit: Duration,
    /// Extra grace on top of the soft limit before the task future is
    /// dropped outright (no further record writes).
    pub queue_hard_grace: Duration,
    /// Directory where uploaded and downloaded files are staged for workers.
    pub worker_directory: String,
    /// Path of the libsql task record store. In-memory when empty.
    pub store_path: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint used for `local` models.
    pub llm_url: String,
    /// OpenAI API key.
    pub openai_api_key: SecretString,
    /// Google Custom Search API key.
    pub google_api_key: SecretString,
    /// Google Custom Search engine id.
    pub google_cse_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            worker_name: "worker".to_string(),
            retry_timeout_ms: 15_000,
            queue_soft_time_limit: Duration::from_secs(5 * 60),
            queue_hard_grace: Duration::from_secs(20),
            worker_directory: "static/worker".to_string(),
            store_path: None,
            llm_url: "http://127.0.0.1:8080".to_string(),
            openai_api_key: SecretString::from(""),
            google_api_key: SecretString::from(""),
            google_cse_id: String::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("RAGSERVE_HOST", defaults.host),
            port: env_parse("RAGSERVE_PORT", defaults.port),
            worker_name: env_or("WORKER_NAME", defaults.worker_name),
            retry_timeout_ms: env_parse("RETRY_TIMEOUT", defaults.retry_timeout_ms),
            queue_soft_time_limit: Duration::from_secs(env_parse(
                "QUEUE_TIME_LIMIT",
                defaults.queue_soft_time_limit.as_secs(),
            )),
            queue_hard_grace: defaults.queue_hard_grace,
            worker_directory: env_or("WORKER_DIRECTORY", defaults.worker_directory),
            store_path: std::env::var("RAGSERVE_STORE_PATH").ok(),
            llm_url: env_or("LLM_URL", defaults.llm_url),
            openai_api_key: SecretString::from(
                std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            ),
            google_api_key: SecretString::from(
                std::env::var("GOOGLE_API_KEY").unwrap_or_default(),
            ),
            google_cse_id: std::env::var("GOOGLE_CSE_ID").unwrap_or_default(),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
