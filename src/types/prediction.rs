//! Prediction result data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bound (inclusive) of the Medium band
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.30;

/// Lower bound (inclusive) of the High band
pub const HIGH_RISK_THRESHOLD: f64 = 0.70;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Determine risk level from a disease probability.
    ///
    /// Bands are half-open with inclusive lower bounds: `[0, 0.3)` is Low,
    /// `[0.3, 0.7)` is Medium and `[0.7, 1]` is High.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if probability >= MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    /// All levels, lowest first
    pub fn all() -> [RiskLevel; 3] {
        [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring a single patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 0 = no disease, 1 = disease present
    pub prediction: u8,

    /// Probability of disease presence (0.0 - 1.0)
    pub probability: f64,

    /// Risk band derived from `probability`
    pub risk_level: RiskLevel,

    /// Completion timestamp
    pub timestamp: DateTime<Utc>,
}

impl PredictionResult {
    /// Build a result, deriving the risk band from the probability
    pub fn new(prediction: u8, probability: f64) -> Self {
        Self {
            prediction,
            probability,
            risk_level: RiskLevel::from_probability(probability),
            timestamp: Utc::now(),
        }
    }
}

/// One slot of a batch response, in input order
#[derive(Debug, Clone)]
pub enum BatchItem {
    Scored(PredictionResult),
    Failed { index: usize, error: String },
}

impl BatchItem {
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchItem::Failed { .. })
    }
}

/// Wire form of a scored batch slot (no per-item timestamp)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItemBody {
    Scored {
        prediction: u8,
        probability: f64,
        risk_level: RiskLevel,
    },
    Failed {
        index: usize,
        error: String,
    },
}

impl From<&BatchItem> for BatchItemBody {
    fn from(item: &BatchItem) -> Self {
        match item {
            BatchItem::Scored(result) => BatchItemBody::Scored {
                prediction: result.prediction,
                probability: result.probability,
                risk_level: result.risk_level,
            },
            BatchItem::Failed { index, error } => BatchItemBody::Failed {
                index: *index,
                error: error.clone(),
            },
        }
    }
}

/// Outcome of scoring a batch of patients
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One entry per input record, same order
    pub items: Vec<BatchItem>,

    /// Wall-clock span of the whole batch, in seconds
    pub batch_latency: f64,
}

impl BatchResult {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|item| item.is_failed()).count()
    }
}

/// JSON body returned by the batch endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub predictions: Vec<BatchItemBody>,
    pub count: usize,
    pub failed: usize,
    pub batch_latency: f64,
}

impl From<&BatchResult> for BatchResponse {
    fn from(result: &BatchResult) -> Self {
        Self {
            predictions: result.items.iter().map(BatchItemBody::from).collect(),
            count: result.count(),
            failed: result.failed(),
            batch_latency: result.batch_latency,
        }
    }
}
