//! Opaque binary classifier interface

use anyhow::Result;

/// A fitted binary classifier.
///
/// Inputs are preprocessed feature vectors in the preprocessor's column
/// order. Implementations must be safe to call concurrently.
pub trait Classifier: Send + Sync {
    /// Short backend/model name used in logs
    fn name(&self) -> &str;

    /// Probability of class 1 (disease present)
    fn predict_proba(&self, features: &[f64]) -> Result<f64>;

    /// Class label, 0 or 1
    fn predict(&self, features: &[f64]) -> Result<u8>;

    /// Feature order the model was trained on, if the artifact records it
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}
