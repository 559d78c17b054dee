//! Type definitions for the prediction service

pub mod patient;
pub mod prediction;

pub use patient::{FieldViolation, PatientRecord, ValidationErrors, FEATURE_NAMES};
pub use prediction::{BatchItem, BatchResponse, BatchResult, PredictionResult, RiskLevel};
