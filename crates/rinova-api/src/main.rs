//! rinova-api - HTTP server for the Rinova medical coding service

use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rinova_api::{build_router, ApiConfig, AppState};
use rinova_db::{Database, PgAnalyticsRepository, PgNoteRepository, PoolConfig};
use rinova_inference::{CodeExtractor, OpenAIBackend};
use rinova_jobs::{ExtractionPipeline, PipelineConfig, ReprocessWorker, WorkerConfig};

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "rinova_api=debug,tower_http=debug")
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rinova_api=debug,rinova_jobs=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("rinova-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // No ANSI in files unless asked for.
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let config = ApiConfig::from_env();
    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if config.rate_limit_enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.rate_limit_requests,
        config.rate_limit_period_secs
    );

    info!("Connecting to database...");
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let notes = Arc::new(PgNoteRepository::new(db.pool.clone()));
    let analytics = Arc::new(PgAnalyticsRepository::new(db.pool.clone()));

    let backend = Arc::new(OpenAIBackend::from_env()?);
    let extractor = CodeExtractor::new(backend.clone()).with_timeout(config.extraction_timeout);
    info!(
        model = extractor.model_name(),
        timeout_secs = config.extraction_timeout.as_secs(),
        "Inference backend initialized"
    );

    let pipeline = Arc::new(
        ExtractionPipeline::new(notes.clone(), extractor).with_config(PipelineConfig::from_env()),
    );

    let worker_config = WorkerConfig::from_env();
    let worker = if worker_config.enabled {
        info!("Starting reprocess worker...");
        Some(ReprocessWorker::new(notes.clone(), pipeline.clone(), worker_config).start())
    } else {
        info!("Reprocess worker disabled");
        None
    };

    let addr = config.bind_addr();
    let state = AppState::new(notes, analytics, pipeline, backend, config)?;
    let app = build_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker {
        handle.shutdown().await?;
    }
    info!("Server stopped");
    Ok(())
}
