//! HTTP surface of the prediction service

mod error;
pub mod handlers;
pub mod middleware;

use crate::metrics::MetricsState;
use crate::pipeline::PredictionService;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

pub use error::panic_response;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub metrics: Arc<MetricsState>,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>) -> Self {
        let metrics = service.metrics().clone();
        Self { service, metrics }
    }
}

/// Build the service router
pub fn router(state: AppState, cors_permissive: bool) -> Router {
    let cors = if cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/predict", post(handlers::predict))
        .route("/predict/batch", post(handlers::predict_batch))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn_with_state(
            state.metrics.clone(),
            middleware::track_requests,
        ))
        .layer(cors)
        .with_state(state)
}
