//! Heart Disease Risk Prediction Service - Main Entry Point
//!
//! Loads the fitted preprocessor and model, then serves predictions and
//! metrics over HTTP until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use heart_risk_service::{
    config::{AppConfig, LoggingConfig},
    http::{self, AppState},
    metrics::{MetricsReporter, MetricsState},
    pipeline::PredictionService,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!("Starting Heart Disease Risk Prediction Service");
    info!(
        model = %config.artifacts.model_path.display(),
        preprocessor = %config.artifacts.preprocessor_path.display(),
        max_batch_size = config.pipeline.max_batch_size,
        "Configuration loaded successfully"
    );

    // Initialize metrics
    let metrics = Arc::new(MetricsState::new());

    // Artifacts are loaded once; a failure leaves the service unavailable
    let service = Arc::new(PredictionService::load(&config, metrics.clone()));
    if !service.is_ready() {
        warn!("Serving in unavailable mode, predictions will return 503");
    }

    // Start metrics reporter
    let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
    let reporter_task = tokio::spawn(reporter.start());

    let app = http::router(AppState::new(service), config.server.cors_permissive);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Print final summary
    reporter_task.abort();
    info!("Service shutting down...");
    metrics.log_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "heart_risk_service={level},tower_http={level}",
            level = logging.level
        ))
        .with_context(|| format!("Invalid log level '{}'", logging.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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
