//! Request tracking: id, span, HTTP metrics and resource gauges

use crate::metrics::MetricsState;
use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Label for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Count and time every request regardless of outcome
pub async fn track_requests(
    State(metrics): State<Arc<MetricsState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_owned();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_owned());
    let request_id = Uuid::new_v4();

    let span = info_span!(
        "http.request",
        request_id = %request_id,
        method = %method,
        endpoint = %endpoint
    );
    let mut response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();
    metrics.record_http_request(&method, &endpoint, status, latency);
    metrics.sample_resources();

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    span.in_scope(|| {
        debug!(
            status = status,
            latency_us = latency.as_micros() as u64,
            "Request completed"
        )
    });

    response
}
