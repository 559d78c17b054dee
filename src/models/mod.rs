//! ML model components

pub mod classifier;
pub mod loader;
pub mod logistic;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::Classifier;
pub use loader::ModelLoader;
pub use logistic::LogisticModel;
