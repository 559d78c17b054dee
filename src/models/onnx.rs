//! ONNX Runtime backed classifier

use super::classifier::Classifier;
use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// Loaded ONNX model with metadata
pub struct OnnxClassifier {
    name: String,
    /// Sessions need exclusive access to run
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load a model exported without a zipmap (probabilities as a float tensor)
    pub fn load<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();
        ort::init().commit()?;

        info!(path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

/// Class-1 probability from a `[batch, classes]` or `[classes]` tensor
fn positive_class_probability(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = *dims.last()?;
    match classes {
        n if n >= 2 => data.get(1).map(|&p| p as f64),
        1 => data.first().map(|&p| p as f64),
        _ => None,
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        let shape = vec![1_i64, features.len() as i64];
        let input: Vec<f32> = features.iter().map(|&x| x as f32).collect();
        let input_tensor =
            Tensor::from_array((shape, input)).context("Failed to create input tensor")?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("model output '{}' missing", self.output_name))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let prob = positive_class_probability(&dims, data)
            .ok_or_else(|| anyhow!("unexpected probability output shape {:?}", dims))?;
        debug!(model = %self.name, prob = prob, "Extracted from tensor");
        Ok(prob)
    }

    fn predict(&self, features: &[f64]) -> Result<u8> {
        Ok(u8::from(self.predict_proba(features)? >= 0.5))
    }
}
