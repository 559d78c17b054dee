//! Service error taxonomy

use crate::preprocessor::PreprocessError;
use crate::types::patient::ValidationErrors;

/// Failure of a prediction request
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed or out-of-domain input
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Model or preprocessor failed to load at startup
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Anything that failed while transforming or scoring
    #[error("prediction failed: {0:#}")]
    Prediction(anyhow::Error),
}

impl ServiceError {
    /// Stable, lowercase error kind used in response bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Prediction(cause) => match cause.downcast_ref::<PreprocessError>() {
                Some(PreprocessError::NotFitted) => "not_fitted",
                Some(PreprocessError::Schema { .. }) => "schema",
                Some(_) => "preprocessing",
                None => "prediction",
            },
        }
    }
}

impl From<PreprocessError> for ServiceError {
    fn from(err: PreprocessError) -> Self {
        ServiceError::Prediction(err.into())
    }
}
