//! Endpoint handlers

use super::AppState;
use crate::error::ServiceError;
use crate::metrics::EXPOSITION_CONTENT_TYPE;
use crate::pipeline::HealthReport;
use crate::types::patient::ValidationErrors;
use crate::types::prediction::{BatchResponse, PredictionResult};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

/// Service descriptor
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let status = if state.service.is_ready() {
        "healthy"
    } else {
        "unhealthy"
    };
    Json(json!({
        "message": "Heart Disease Risk Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "predict": "/predict",
            "predict_batch": "/predict/batch",
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.service.health();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

pub async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictionResult>, ServiceError> {
    let input = parse_body(&body)?;
    state.service.predict_one(&input).map(Json)
}

pub async fn predict_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchResponse>, ServiceError> {
    let input = parse_body(&body)?;
    let result = state.service.predict_batch(&input)?;
    Ok(Json(BatchResponse::from(&result)))
}

/// Malformed JSON is a validation failure of the whole body
fn parse_body(body: &[u8]) -> Result<Value, ServiceError> {
    serde_json::from_slice(body).map_err(|e| {
        ServiceError::Validation(ValidationErrors::single(
            "body",
            format!("malformed JSON: {e}"),
        ))
    })
}
