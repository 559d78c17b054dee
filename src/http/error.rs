use crate::error::ServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::any::Any;
use tracing::error;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let details = match &self {
            ServiceError::Validation(errors) => json!(errors.violations),
            _ => json!([]),
        };
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "details": details,
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Turn a handler panic into a 500 with the usual error body
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "Request handler panicked");

    ServiceError::Prediction(anyhow::anyhow!("internal error while handling the request"))
        .into_response()
}
