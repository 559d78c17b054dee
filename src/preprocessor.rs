//! Preprocessing for heart disease model inference.
//!
//! Median imputation followed by standard scaling, fitted once on training
//! data and applied unchanged at serving time. Statistics are learned on
//! the training set and persisted as a JSON artifact next to the model.

use crate::types::patient::PatientRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Artifact format version written by `Preprocessor::save`
pub const ARTIFACT_VERSION: u32 = 1;

/// Scales at or below this are treated as constant columns.
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("preprocessor must be fitted before transform")]
    NotFitted,

    #[error("missing expected column '{column}'")]
    Schema { column: String },

    #[error("column '{column}' has no observed values to fit on")]
    EmptyColumn { column: String },

    #[error("row {row} has {found} values but {expected} columns")]
    Shape {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("training data has no rows")]
    EmptyDataset,

    #[error("malformed data: {0}")]
    Parse(String),

    #[error("unsupported artifact version {0}")]
    Version(u32),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Column-named table of optional numeric values (`None` = missing)
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl Dataset {
    /// Create a dataset, checking every row has one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> Result<Self, PreprocessError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PreprocessError::Shape {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Single-row dataset from a validated patient record
    pub fn from_record(record: &PatientRecord) -> Self {
        let (columns, row): (Vec<String>, Vec<Option<f64>>) = record
            .named_values()
            .into_iter()
            .map(|(name, value)| (name.to_string(), Some(value)))
            .unzip();
        Self {
            columns,
            rows: vec![row],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Remove a column (e.g. the training target), returning its values
    pub fn drop_column(&mut self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.columns.remove(idx);
        Some(self.rows.iter_mut().map(|row| row.remove(idx)).collect())
    }

    /// Parse a header CSV; empty cells and `?` are missing values.
    pub fn from_csv_str(text: &str) -> Result<Self, PreprocessError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| PreprocessError::Parse("missing CSV header".to_string()))?;
        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let mut row = Vec::with_capacity(columns.len());
            for cell in line.split(',') {
                let cell = cell.trim().trim_matches('"');
                if cell.is_empty() || cell == "?" {
                    row.push(None);
                } else {
                    let value = cell.parse::<f64>().map_err(|e| {
                        PreprocessError::Parse(format!("line {}: '{}': {}", line_no + 2, cell, e))
                    })?;
                    row.push(Some(value));
                }
            }
            rows.push(row);
        }

        Self::new(columns, rows)
    }

    /// Parse a JSON array of row objects; `null` or absent keys are missing values.
    ///
    /// Columns are the (sorted) keys of the first row.
    pub fn from_json_str(text: &str) -> Result<Self, PreprocessError> {
        let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(text)?;
        let columns: Vec<String> = records
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let mut row = Vec::with_capacity(columns.len());
            for column in &columns {
                match record.get(column) {
                    None | Some(serde_json::Value::Null) => row.push(None),
                    Some(v) => row.push(Some(v.as_f64().ok_or_else(|| {
                        PreprocessError::Parse(format!("row {i}: column '{column}' is not numeric"))
                    })?)),
                }
            }
            rows.push(row);
        }

        Self::new(columns, rows)
    }

    /// Load a `.csv` or `.json` training file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PreprocessError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PreprocessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            _ => Self::from_csv_str(&text)?,
        };
        info!(
            path = %path.display(),
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "Loaded training data"
        );
        Ok(dataset)
    }
}

/// Statistics learned by `fit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedStats {
    pub version: u32,
    /// Training column order
    pub columns: Vec<String>,
    /// Per-column imputation value
    pub medians: Vec<f64>,
    /// Per-column mean after imputation
    pub means: Vec<f64>,
    /// Per-column standard deviation, 1.0 for constant columns
    pub scales: Vec<f64>,
    pub fitted_rows: usize,
}

/// Median imputer + standard scaler
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    stats: Option<FittedStats>,
}

impl Preprocessor {
    /// Create an unfitted preprocessor
    pub fn new() -> Self {
        Self { stats: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.stats.is_some()
    }

    pub fn stats(&self) -> Option<&FittedStats> {
        self.stats.as_ref()
    }

    /// Fitted column order
    pub fn columns(&self) -> Option<&[String]> {
        self.stats.as_ref().map(|s| s.columns.as_slice())
    }

    /// Learn imputation and scaling statistics, discarding any previous fit.
    pub fn fit(&mut self, data: &Dataset) -> Result<(), PreprocessError> {
        self.stats = None;
        if data.is_empty() {
            return Err(PreprocessError::EmptyDataset);
        }

        let n_cols = data.columns.len();
        let mut medians = Vec::with_capacity(n_cols);
        let mut means = Vec::with_capacity(n_cols);
        let mut scales = Vec::with_capacity(n_cols);

        for (col, name) in data.columns.iter().enumerate() {
            let mut observed: Vec<f64> = data
                .rows
                .iter()
                .filter_map(|row| row[col])
                .filter(|v| v.is_finite())
                .collect();
            if observed.is_empty() {
                return Err(PreprocessError::EmptyColumn {
                    column: name.clone(),
                });
            }
            observed.sort_by(|a, b| a.total_cmp(b));
            let median = median_of_sorted(&observed);

            // Scaler is fitted on the imputed column.
            let imputed: Vec<f64> = data
                .rows
                .iter()
                .map(|row| row[col].filter(|v| v.is_finite()).unwrap_or(median))
                .collect();
            let n = imputed.len() as f64;
            let mean = imputed.iter().sum::<f64>() / n;
            let variance = imputed.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();

            medians.push(median);
            means.push(mean);
            scales.push(if std > MIN_SCALE { std } else { 1.0 });
        }

        info!(
            rows = data.len(),
            columns = n_cols,
            "Preprocessor fitted"
        );

        self.stats = Some(FittedStats {
            version: ARTIFACT_VERSION,
            columns: data.columns.clone(),
            medians,
            means,
            scales,
            fitted_rows: data.len(),
        });
        Ok(())
    }

    /// Impute and scale rows using the fitted statistics.
    ///
    /// Columns are selected by name in fitted order; extra input columns are ignored.
    pub fn transform(&self, data: &Dataset) -> Result<Vec<Vec<f64>>, PreprocessError> {
        let stats = self.stats.as_ref().ok_or(PreprocessError::NotFitted)?;

        let positions: HashMap<&str, usize> = data
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let mut index = Vec::with_capacity(stats.columns.len());
        for column in &stats.columns {
            let idx = positions
                .get(column.as_str())
                .copied()
                .ok_or_else(|| PreprocessError::Schema {
                    column: column.clone(),
                })?;
            index.push(idx);
        }

        let out = data
            .rows
            .iter()
            .map(|row| {
                index
                    .iter()
                    .enumerate()
                    .map(|(col, &src)| {
                        let value = row
                            .get(src)
                            .copied()
                            .flatten()
                            .filter(|v| v.is_finite())
                            .unwrap_or(stats.medians[col]);
                        (value - stats.means[col]) / stats.scales[col]
                    })
                    .collect()
            })
            .collect();
        Ok(out)
    }

    /// Fit then transform the same data
    pub fn fit_transform(&mut self, data: &Dataset) -> Result<Vec<Vec<f64>>, PreprocessError> {
        self.fit(data)?;
        self.transform(data)
    }

    /// Transform one validated patient record into a model input vector
    pub fn transform_record(&self, record: &PatientRecord) -> Result<Vec<f64>, PreprocessError> {
        let mut rows = self.transform(&Dataset::from_record(record))?;
        rows.pop().ok_or(PreprocessError::EmptyDataset)
    }

    /// Persist the fitted statistics as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PreprocessError> {
        let path = path.as_ref();
        let stats = self.stats.as_ref().ok_or(PreprocessError::NotFitted)?;
        let json = serde_json::to_string_pretty(stats)?;
        std::fs::write(path, json).map_err(|source| PreprocessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Preprocessor saved");
        Ok(())
    }

    /// Load a fitted preprocessor artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PreprocessError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PreprocessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stats: FittedStats = serde_json::from_str(&text)?;
        if stats.version != ARTIFACT_VERSION {
            return Err(PreprocessError::Version(stats.version));
        }
        let n = stats.columns.len();
        if stats.medians.len() != n || stats.means.len() != n || stats.scales.len() != n {
            return Err(PreprocessError::Parse(format!(
                "artifact statistics do not match its {n} columns"
            )));
        }
        info!(path = %path.display(), columns = n, "Preprocessor loaded");
        Ok(Self { stats: Some(stats) })
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
