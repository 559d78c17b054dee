//! Model artifact loader

use super::classifier::Classifier;
use super::logistic::LogisticModel;
use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loader that picks a model backend from the artifact extension
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a single model from file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Arc<dyn Classifier>> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("model file not found: {}", path.display());
        }

        let model: Arc<dyn Classifier> = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Arc::new(LogisticModel::load(path)?),
            Some("onnx") => self.load_onnx(path)?,
            other => bail!(
                "unsupported model artifact extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ),
        };

        info!(model = %model.name(), path = %path.display(), "Model ready");
        Ok(model)
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        Ok(Arc::new(super::onnx::OnnxClassifier::load(
            path,
            self.onnx_threads,
        )?))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        bail!(
            "{} is an ONNX model but the service was built without the `onnx` feature",
            path.display()
        )
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
