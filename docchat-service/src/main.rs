use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;
mod chunking;
mod config;
mod db;
mod error;
mod ingestion;
mod provider;
mod service;
mod tasks;
mod telemetry;

use crate::config::{TaskBackend, load_config};
use crate::db::Database;
use crate::error::ServiceError;
use crate::service::DocChatService;
use crate::tasks::{MemoryTaskStore, SqliteTaskStore, TaskStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting DocChat service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(load_config()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        data_dir = %config.storage.data_dir.display(),
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.storage.data_dir)?;

    // Initialize database
    let db_path = config.storage.data_dir.join("docchat.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let metrics = match telemetry::install_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics exporter unavailable");
            None
        }
    };

    let providers = provider::build_providers(&config.llm, &config.embeddings).map_err(|e| {
        ServiceError::Config {
            message: e.to_string(),
        }
    })?;

    let tasks: Arc<dyn TaskStore> = match config.tasks.backend {
        TaskBackend::Memory => Arc::new(MemoryTaskStore::new()),
        TaskBackend::Sqlite => Arc::new(SqliteTaskStore::new(db.clone())?),
    };
    info!(backend = ?config.tasks.backend, "Task store ready");

    let service = Arc::new(DocChatService::new(config.clone(), db, tasks, providers));

    if service.llm_available().await {
        info!("Language model reachable");
    } else {
        warn!("Language model not reachable; chat requests will fail until it is");
    }

    // Evict finished tasks and expired collections in the background
    let shutdown = CancellationToken::new();
    let sweeper = service.spawn_retention_sweeper(shutdown.clone());

    let app = api::router(service, metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Retention sweeper ended abnormally");
    }
    info!("DocChat service stopped");

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docchat_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
