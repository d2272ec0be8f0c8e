use std::collections::HashMap;
use std::sync::Arc;

use ragserve::api::{AppState, app_routes};
use ragserve::config::ServiceConfig;
use ragserve::ingest::TextPartitioner;
use ragserve::queue::{
    EmbedDocTask, HealthCheckTask, LocalQueue, Operation, TaskHandler, TaskLifecycle, TaskQueue,
};
use ragserve::store::{LibSqlStore, MemoryStore, RecordStore};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(ServiceConfig::from_env());

    let store: Arc<dyn RecordStore> = match &config.store_path {
        Some(path) => Arc::new(LibSqlStore::new_local(std::path::Path::new(path)).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let lifecycle = TaskLifecycle::new(store.clone(), config.worker_name.clone());
    let partitioner = Arc::new(TextPartitioner);
    let http = reqwest::Client::new();

    let mut handlers: HashMap<String, Arc<dyn TaskHandler>> = HashMap::new();
    handlers.insert(
        Operation::EmbedDoc.task_name(&config.worker_name),
        Arc::new(EmbedDocTask::new(
            store.clone(),
            partitioner,
            http.clone(),
        )),
    );
    handlers.insert(
        Operation::HealthCheck.task_name(&config.worker_name),
        Arc::new(HealthCheckTask),
    );
    let queue: Arc<dyn TaskQueue> = Arc::new(LocalQueue::start(
        handlers,
        lifecycle,
        config.queue_soft_time_limit,
        config.queue_hard_grace,
    ));

    let state = AppState::new(config.clone(), store, queue);
    let app = app_routes(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, worker = %config.worker_name, "ragserve listening");
    axum::serve(listener, app).await?;
    Ok(())
}
