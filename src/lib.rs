//! Heart Disease Risk Prediction Service
//!
//! Scores patient records with a fitted preprocessor and binary classifier,
//! bands the probability into a risk level and exposes the result over HTTP
//! together with Prometheus-style metrics.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessor;
pub mod types;

pub use config::AppConfig;
pub use error::ServiceError;
pub use metrics::MetricsState;
pub use pipeline::PredictionService;
pub use preprocessor::Preprocessor;
pub use types::{patient::PatientRecord, prediction::PredictionResult};
