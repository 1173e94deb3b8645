use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{info, warn};

mod ai;
mod api;
mod chunking;
mod config;
mod db;
mod error;
mod object_storage;
mod service;
mod store;
mod websocket;

use crate::ai::AiClient;
use crate::config::Config;
use crate::db::Database;
use crate::object_storage::ObjectStorageClient;
use crate::service::IntakeService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting document intake service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(Config::load()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        api_keys = config.auth.api_keys.len(),
        "Configuration loaded"
    );
    if config.auth.api_keys.is_empty() {
        warn!("No API keys configured; every /api request will be rejected");
    }

    // Initialize database
    let db = Arc::new(Database::open(&config.database.path)?);
    info!(path = %config.database.path.display(), "Database initialized");

    // Provider clients
    let ai = Arc::new(AiClient::new(config.ai.clone())?);
    let storage = Arc::new(ObjectStorageClient::new(config.storage.clone())?);
    info!(
        ai_url = %config.ai.base_url,
        storage_url = %config.storage.base_url,
        bucket = %config.storage.bucket,
        "Provider clients initialized"
    );

    let metrics = init_metrics();

    let service = Arc::new(IntakeService::new(Arc::clone(&config), db, ai, storage));
    let app = api::router(Arc::clone(&service), metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    service.shutdown().await;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intake_service=info,tower_http=info"));

    let json = std::env::var("INTAKE_LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        let format = fmt::format()
            .with_target(true)
            .with_thread_ids(true)
            .compact();
        registry.with(fmt::layer().event_format(format)).init();
    }
}

/// Install the Prometheus recorder. The service keeps running without
/// metrics when installation fails.
fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            metrics::describe_counter!(
                "intake_documents_uploaded_total",
                "Uploads accepted for processing"
            );
            metrics::describe_counter!(
                "intake_runs_completed_total",
                "Pipeline runs that reached completion"
            );
            metrics::describe_counter!("intake_runs_failed_total", "Pipeline runs that failed");
            metrics::describe_counter!(
                "intake_image_uploads_failed_total",
                "Extracted images skipped because their upload failed"
            );
            metrics::describe_histogram!(
                "intake_run_duration_seconds",
                metrics::Unit::Seconds,
                "Duration of finished pipeline runs"
            );
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
