//! Logistic regression model artifact

use super::classifier::Classifier;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_threshold() -> f64 {
    0.5
}

/// Coefficients exported from a fitted logistic regression.
///
/// ```json
/// {"kind": "logistic_regression", "feature_names": ["age", ...],
///  "coefficients": [0.1, ...], "intercept": -0.3, "threshold": 0.5}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename = "logistic_regression")]
pub struct LogisticModel {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Probability at or above which the label is 1
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl LogisticModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            feature_names: None,
            coefficients,
            intercept,
            threshold: default_threshold(),
        }
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Load and check a JSON artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model from {}", path.display()))?;
        let model: LogisticModel = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse model {}", path.display()))?;

        if model.coefficients.is_empty() {
            bail!("model {} has no coefficients", path.display());
        }
        if let Some(names) = &model.feature_names {
            if names.len() != model.coefficients.len() {
                bail!(
                    "model {} lists {} feature names for {} coefficients",
                    path.display(),
                    names.len(),
                    model.coefficients.len()
                );
            }
        }
        if !(0.0..=1.0).contains(&model.threshold) {
            bail!("model threshold {} outside [0, 1]", model.threshold);
        }

        info!(
            path = %path.display(),
            features = model.coefficients.len(),
            "Logistic regression model loaded"
        );
        Ok(model)
    }

    /// Persist as a JSON artifact
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write model to {}", path.display()))
    }

    fn decision(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            bail!(
                "feature length mismatch: got {}, expected {}",
                features.len(),
                self.coefficients.len()
            );
        }
        Ok(self
            .coefficients
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticModel {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        Ok(sigmoid(self.decision(features)?))
    }

    fn predict(&self, features: &[f64]) -> Result<u8> {
        Ok(u8::from(self.predict_proba(features)? >= self.threshold))
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}
