//! Prediction pipeline: validation, preprocessing, inference and risk banding

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::metrics::MetricsState;
use crate::models::{Classifier, ModelLoader};
use crate::preprocessor::Preprocessor;
use crate::types::patient::{PatientRecord, ValidationErrors};
use crate::types::prediction::{BatchItem, BatchResult, PredictionResult};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Loaded artifacts, or the reason they are missing.
///
/// The state is fixed at startup; there is no transition back to `Ready`
/// without a restart.
pub enum Availability {
    Ready {
        preprocessor: Arc<Preprocessor>,
        model: Arc<dyn Classifier>,
    },
    Unavailable {
        reason: String,
        model_loaded: bool,
        preprocessor_loaded: bool,
    },
}

/// Body of the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub model_loaded: bool,
    pub preprocessor_loaded: bool,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.model_loaded && self.preprocessor_loaded && self.status == "healthy"
    }
}

/// Heart disease prediction service
pub struct PredictionService {
    state: Availability,
    metrics: Arc<MetricsState>,
    max_batch_size: usize,
}

impl PredictionService {
    /// Load artifacts from the configured paths.
    ///
    /// Never fails: a missing or inconsistent artifact leaves the service
    /// `Unavailable` and every request is answered with 503.
    pub fn load(config: &AppConfig, metrics: Arc<MetricsState>) -> Self {
        let preprocessor = Preprocessor::load(&config.artifacts.preprocessor_path)
            .map_err(|e| {
                error!(
                    path = %config.artifacts.preprocessor_path.display(),
                    error = %e,
                    "Failed to load preprocessor"
                );
                e
            })
            .ok();

        let model = ModelLoader::with_threads(config.artifacts.onnx_threads)
            .load(&config.artifacts.model_path)
            .map_err(|e| {
                error!(
                    path = %config.artifacts.model_path.display(),
                    error = %e,
                    "Failed to load model"
                );
                e
            })
            .ok();

        let state = match (preprocessor, model) {
            (Some(preprocessor), Some(model)) => match check_feature_order(&preprocessor, model.as_ref()) {
                Ok(()) => Availability::Ready {
                    preprocessor: Arc::new(preprocessor),
                    model,
                },
                Err(reason) => {
                    error!(reason = %reason, "Model and preprocessor disagree");
                    Availability::Unavailable {
                        reason,
                        model_loaded: true,
                        preprocessor_loaded: true,
                    }
                }
            },
            (preprocessor, model) => Availability::Unavailable {
                reason: "model or preprocessor failed to load".to_string(),
                model_loaded: model.is_some(),
                preprocessor_loaded: preprocessor.is_some(),
            },
        };

        Self::with_state(state, metrics, config.pipeline.max_batch_size)
    }

    /// Build a ready service from in-memory artifacts
    pub fn from_parts(
        preprocessor: Preprocessor,
        model: Arc<dyn Classifier>,
        metrics: Arc<MetricsState>,
        max_batch_size: usize,
    ) -> Self {
        let state = Availability::Ready {
            preprocessor: Arc::new(preprocessor),
            model,
        };
        Self::with_state(state, metrics, max_batch_size)
    }

    /// Build a service that refuses every prediction
    pub fn unavailable(reason: impl Into<String>, metrics: Arc<MetricsState>) -> Self {
        let state = Availability::Unavailable {
            reason: reason.into(),
            model_loaded: false,
            preprocessor_loaded: false,
        };
        Self::with_state(state, metrics, AppConfig::default().pipeline.max_batch_size)
    }

    fn with_state(state: Availability, metrics: Arc<MetricsState>, max_batch_size: usize) -> Self {
        match &state {
            Availability::Ready { model, preprocessor } => info!(
                model = %model.name(),
                columns = preprocessor.columns().map_or(0, |c| c.len()),
                max_batch_size = max_batch_size,
                "Prediction service ready"
            ),
            Availability::Unavailable { reason, .. } => {
                warn!(reason = %reason, "Prediction service unavailable")
            }
        }
        metrics.set_health(matches!(state, Availability::Ready { .. }));
        Self {
            state,
            metrics,
            max_batch_size,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, Availability::Ready { .. })
    }

    pub fn metrics(&self) -> &Arc<MetricsState> {
        &self.metrics
    }

    /// Report artifact status and update the health gauge
    pub fn health(&self) -> HealthReport {
        let (model_loaded, preprocessor_loaded) = match &self.state {
            Availability::Ready { .. } => (true, true),
            Availability::Unavailable {
                model_loaded,
                preprocessor_loaded,
                ..
            } => (*model_loaded, *preprocessor_loaded),
        };
        let healthy = self.is_ready();
        self.metrics.set_health(healthy);

        HealthReport {
            status: if healthy { "healthy" } else { "unhealthy" },
            model_loaded,
            preprocessor_loaded,
            timestamp: Utc::now(),
        }
    }

    /// Validate and score one patient JSON object
    pub fn predict_one(&self, input: &Value) -> Result<PredictionResult, ServiceError> {
        let record = PatientRecord::from_json(input).map_err(|e| self.fail(e.into()))?;
        self.metrics.record_prediction_request();
        self.predict_record(&record)
    }

    /// Score an already validated record
    pub fn predict_record(&self, record: &PatientRecord) -> Result<PredictionResult, ServiceError> {
        let start = Instant::now();
        let (preprocessor, model) = self.ready().map_err(|e| self.fail(e))?;
        let result = self
            .score(preprocessor, model, record)
            .map_err(|e| self.fail(e))?;
        self.metrics
            .record_prediction(result.prediction, result.risk_level, start.elapsed());
        Ok(result)
    }

    /// Validate and score a JSON array of patients.
    ///
    /// The whole batch is validated and checked for availability before any
    /// item is scored. Scoring failures are reported per item in input order.
    pub fn predict_batch(&self, input: &Value) -> Result<BatchResult, ServiceError> {
        let start = Instant::now();

        if let Some(items) = input.as_array() {
            if items.len() > self.max_batch_size {
                return Err(self.fail(
                    ValidationErrors::single(
                        "body",
                        format!(
                            "batch of {} exceeds the maximum of {}",
                            items.len(),
                            self.max_batch_size
                        ),
                    )
                    .into(),
                ));
            }
        }
        let records = PatientRecord::batch_from_json(input).map_err(|e| self.fail(e.into()))?;
        self.metrics.record_batch_request(records.len());
        let (preprocessor, model) = self.ready().map_err(|e| self.fail(e))?;

        let items: Vec<BatchItem> = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let item_start = Instant::now();
                match self.score(preprocessor, model, record) {
                    Ok(result) => {
                        self.metrics.record_prediction(
                            result.prediction,
                            result.risk_level,
                            item_start.elapsed(),
                        );
                        BatchItem::Scored(result)
                    }
                    Err(e) => {
                        let e = self.fail(e);
                        BatchItem::Failed {
                            index,
                            error: e.to_string(),
                        }
                    }
                }
            })
            .collect();

        let elapsed = start.elapsed();
        self.metrics.record_batch_latency(elapsed);

        let result = BatchResult {
            items,
            batch_latency: elapsed.as_secs_f64(),
        };
        info!(
            count = result.count(),
            failed = result.failed(),
            batch_latency_ms = format!("{:.3}", elapsed.as_secs_f64() * 1000.0),
            "Batch prediction complete"
        );
        Ok(result)
    }

    fn ready(&self) -> Result<(&Preprocessor, &dyn Classifier), ServiceError> {
        match &self.state {
            Availability::Ready {
                preprocessor,
                model,
            } => Ok((preprocessor.as_ref(), model.as_ref())),
            Availability::Unavailable { reason, .. } => {
                Err(ServiceError::Unavailable(reason.clone()))
            }
        }
    }

    fn score(
        &self,
        preprocessor: &Preprocessor,
        model: &dyn Classifier,
        record: &PatientRecord,
    ) -> Result<PredictionResult, ServiceError> {
        debug!(record = ?record, "Scoring patient record");

        let features = preprocessor.transform_record(record)?;
        let probability = model
            .predict_proba(&features)
            .map_err(ServiceError::Prediction)?;
        let prediction = model.predict(&features).map_err(ServiceError::Prediction)?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(ServiceError::Prediction(anyhow!(
                "model {} returned probability {probability} outside [0, 1]",
                model.name()
            )));
        }
        if prediction > 1 {
            return Err(ServiceError::Prediction(anyhow!(
                "model {} returned label {prediction}",
                model.name()
            )));
        }

        let result = PredictionResult::new(prediction, probability);
        info!(
            prediction = result.prediction,
            probability = format!("{:.4}", result.probability),
            risk_level = %result.risk_level,
            "Prediction complete"
        );
        Ok(result)
    }

    /// Count and log a failure on its way out
    fn fail(&self, err: ServiceError) -> ServiceError {
        self.metrics.record_prediction_error(err.kind());
        match &err {
            ServiceError::Validation(e) => {
                debug!(violations = e.violations.len(), error = %e, "Rejected input")
            }
            ServiceError::Unavailable(reason) => {
                warn!(reason = %reason, "Prediction refused, service unavailable")
            }
            ServiceError::Prediction(cause) => {
                let cause = format!("{cause:#}");
                error!(kind = err.kind(), error = %cause, "Prediction failed")
            }
        }
        err
    }
}

fn check_feature_order(preprocessor: &Preprocessor, model: &dyn Classifier) -> Result<(), String> {
    let Some(columns) = preprocessor.columns() else {
        return Err("preprocessor artifact is not fitted".to_string());
    };
    match model.feature_names() {
        Some(names) if names != columns => Err(format!(
            "model features {names:?} do not match preprocessor columns {columns:?}"
        )),
        _ => Ok(()),
    }
}
