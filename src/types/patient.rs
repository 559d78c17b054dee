//! Patient data structures and input validation for heart disease risk scoring

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Feature names in the order the preprocessor is fitted on.
pub const FEATURE_NAMES: [&str; 13] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// Declared domain of one input field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldConstraint {
    /// Closed numeric interval
    Range { min: f64, max: f64 },
    /// Lower bound only
    AtLeast(f64),
    /// Enumerated codes
    OneOf(&'static [f64]),
    /// Any finite number
    Unbounded,
}

impl FieldConstraint {
    pub fn check(&self, value: f64) -> Result<(), String> {
        match self {
            FieldConstraint::AtLeast(min) => {
                if value >= *min {
                    Ok(())
                } else {
                    Err(format!("{value} must be at least {min}"))
                }
            }
            FieldConstraint::Unbounded => {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err(format!("{value} is not a finite number"))
                }
            }
            FieldConstraint::Range { min, max } => {
                if (*min..=*max).contains(&value) {
                    Ok(())
                } else {
                    Err(format!("{value} out of range [{min}, {max}]"))
                }
            }
            FieldConstraint::OneOf(allowed) => {
                if allowed.iter().any(|a| *a == value) {
                    Ok(())
                } else {
                    let allowed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
                    Err(format!("{value} must be one of {{{}}}", allowed.join(", ")))
                }
            }
        }
    }
}

/// Constraint table, one entry per feature in `FEATURE_NAMES` order.
pub const FIELD_CONSTRAINTS: [(&str, FieldConstraint); 13] = [
    ("age", FieldConstraint::Range { min: 0.0, max: 120.0 }),
    ("sex", FieldConstraint::OneOf(&[0.0, 1.0])),
    ("cp", FieldConstraint::OneOf(&[1.0, 2.0, 3.0, 4.0])),
    ("trestbps", FieldConstraint::AtLeast(0.0)),
    ("chol", FieldConstraint::AtLeast(0.0)),
    ("fbs", FieldConstraint::OneOf(&[0.0, 1.0])),
    ("restecg", FieldConstraint::OneOf(&[0.0, 1.0, 2.0])),
    ("thalach", FieldConstraint::Range { min: 0.0, max: 250.0 }),
    ("exang", FieldConstraint::OneOf(&[0.0, 1.0])),
    ("oldpeak", FieldConstraint::AtLeast(0.0)),
    ("slope", FieldConstraint::OneOf(&[1.0, 2.0, 3.0])),
    ("ca", FieldConstraint::Range { min: 0.0, max: 3.0 }),
    // clients send codes outside the Cleveland {3, 6, 7} set
    ("thal", FieldConstraint::Unbounded),
];

/// A single offending input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Every violation found in a request body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    /// Prefix every field path, used for batch item positions
    fn prefixed(self, prefix: &str) -> Self {
        Self {
            violations: self
                .violations
                .into_iter()
                .map(|v| FieldViolation {
                    field: format!("{prefix}.{}", v.field),
                    message: v.message,
                })
                .collect(),
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        write!(f, "invalid input ({})", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Clinical features of one patient (Cleveland heart disease schema)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Age in years
    pub age: f64,
    /// Sex (1 = male, 0 = female)
    pub sex: f64,
    /// Chest pain type (1-4)
    pub cp: f64,
    /// Resting blood pressure (mm Hg)
    pub trestbps: f64,
    /// Serum cholesterol (mg/dl)
    pub chol: f64,
    /// Fasting blood sugar > 120 mg/dl (1 = true)
    pub fbs: f64,
    /// Resting ECG results (0-2)
    pub restecg: f64,
    /// Maximum heart rate achieved
    pub thalach: f64,
    /// Exercise induced angina (1 = yes)
    pub exang: f64,
    /// ST depression induced by exercise relative to rest
    pub oldpeak: f64,
    /// Slope of the peak exercise ST segment (1-3)
    pub slope: f64,
    /// Number of major vessels colored by fluoroscopy (0-3)
    pub ca: f64,
    /// Thalassemia (3 = normal, 6 = fixed defect, 7 = reversible defect)
    pub thal: f64,
}

impl PatientRecord {
    /// Validate a JSON object into a record, collecting every violation.
    pub fn from_json(value: &Value) -> Result<Self, ValidationErrors> {
        let Some(object) = value.as_object() else {
            return Err(ValidationErrors::single(
                "body",
                "expected a JSON object with patient fields",
            ));
        };
        let values = validate_fields(object)?;
        Self::from_vec(&values).map_err(|e| ValidationErrors::single("body", e))
    }

    /// Validate a JSON array of patient objects; field paths are prefixed with `[i]`.
    pub fn batch_from_json(value: &Value) -> Result<Vec<Self>, ValidationErrors> {
        let Some(items) = value.as_array() else {
            return Err(ValidationErrors::single(
                "body",
                "expected a JSON array of patient objects",
            ));
        };

        let mut records = Vec::with_capacity(items.len());
        let mut errors = ValidationErrors::default();
        for (index, item) in items.iter().enumerate() {
            match Self::from_json(item) {
                Ok(record) => records.push(record),
                Err(e) => errors
                    .violations
                    .extend(e.prefixed(&format!("[{index}]")).violations),
            }
        }

        if errors.is_empty() {
            Ok(records)
        } else {
            Err(errors)
        }
    }

    /// Check every field against `FIELD_CONSTRAINTS`
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        for ((field, constraint), value) in FIELD_CONSTRAINTS.iter().zip(self.to_vec()) {
            if let Err(message) = constraint.check(value) {
                errors.push(*field, message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Convert to a vector in `FEATURE_NAMES` order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.age,
            self.sex,
            self.cp,
            self.trestbps,
            self.chol,
            self.fbs,
            self.restecg,
            self.thalach,
            self.exang,
            self.oldpeak,
            self.slope,
            self.ca,
            self.thal,
        ]
    }

    /// Create a record from a vector in `FEATURE_NAMES` order.
    pub fn from_vec(v: &[f64]) -> Result<Self, String> {
        if v.len() != FEATURE_NAMES.len() {
            return Err(format!(
                "expected {} features, got {}",
                FEATURE_NAMES.len(),
                v.len()
            ));
        }

        Ok(Self {
            age: v[0],
            sex: v[1],
            cp: v[2],
            trestbps: v[3],
            chol: v[4],
            fbs: v[5],
            restecg: v[6],
            thalach: v[7],
            exang: v[8],
            oldpeak: v[9],
            slope: v[10],
            ca: v[11],
            thal: v[12],
        })
    }

    /// Column/value pairs, the shape the preprocessor consumes
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.to_vec()).collect()
    }
}

fn validate_fields(object: &Map<String, Value>) -> Result<Vec<f64>, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut values = Vec::with_capacity(FIELD_CONSTRAINTS.len());

    for (field, constraint) in FIELD_CONSTRAINTS.iter() {
        match object.get(*field) {
            None | Some(Value::Null) => errors.push(*field, "field required"),
            Some(raw) => match raw.as_f64() {
                Some(value) => match constraint.check(value) {
                    Ok(()) => values.push(value),
                    Err(message) => errors.push(*field, message),
                },
                None => errors.push(*field, format!("expected a number, got {raw}")),
            },
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
            "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 3,
            "ca": 0, "thal": 6
        })
    }

    #[test]
    fn test_valid_record() {
        let record = PatientRecord::from_json(&sample()).unwrap();
        assert_eq!(record.age, 63.0);
        assert_eq!(record.oldpeak, 2.3);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let body = json!({ "age": -10, "sex": 1, "cp": 3 });
        let errors = PatientRecord::from_json(&body).unwrap_err();
        let fields = errors.fields();

        assert!(fields.contains(&"age"));
        assert!(fields.contains(&"thal"));
        // age plus the ten missing fields
        assert_eq!(errors.violations.len(), 11);
    }

    #[test]
    fn test_categorical_domain() {
        let mut body = sample();
        body["sex"] = json!(5);
        body["cp"] = json!(0);
        let errors = PatientRecord::from_json(&body).unwrap_err();
        assert_eq!(errors.fields(), vec!["sex", "cp"]);
    }

    #[test]
    fn test_accepts_open_domain_fields() {
        let payloads = [
            json!({
                "age": 37, "sex": 1, "cp": 2, "trestbps": 130, "chol": 250, "fbs": 0,
                "restecg": 1, "thalach": 187, "exang": 0, "oldpeak": 3.5, "slope": 1,
                "ca": 0, "thal": 2
            }),
            json!({
                "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
                "restecg": 1, "thalach": 150, "exang": 1, "oldpeak": 2.3, "slope": 1,
                "ca": 1, "thal": 1
            }),
            json!({
                "age": 70, "sex": 0, "cp": 4, "trestbps": 320, "chol": 1200, "fbs": 1,
                "restecg": 2, "thalach": 90, "exang": 1, "oldpeak": 12.5, "slope": 3,
                "ca": 3, "thal": 7
            }),
        ];
        for payload in &payloads {
            let record = PatientRecord::from_json(payload).unwrap();
            assert!(record.validate().is_ok());
        }
    }

    #[test]
    fn test_open_domain_fields_keep_lower_bound() {
        let mut body = sample();
        body["trestbps"] = json!(-1);
        body["oldpeak"] = json!(-0.5);
        let errors = PatientRecord::from_json(&body).unwrap_err();
        assert_eq!(errors.fields(), vec!["trestbps", "oldpeak"]);
    }

    #[test]
    fn test_non_numeric_field() {
        let mut body = sample();
        body["chol"] = json!("high");
        let errors = PatientRecord::from_json(&body).unwrap_err();
        assert_eq!(errors.fields(), vec!["chol"]);
    }

    #[test]
    fn test_batch_paths_are_indexed() {
        let mut bad = sample();
        bad["age"] = json!(150);
        let errors = PatientRecord::batch_from_json(&json!([sample(), bad])).unwrap_err();
        assert_eq!(errors.fields(), vec!["[1].age"]);
    }

    #[test]
    fn test_vec_round_trip_order() {
        let record = PatientRecord::from_json(&sample()).unwrap();
        let v = record.to_vec();
        assert_eq!(v.len(), FEATURE_NAMES.len());
        assert_eq!(PatientRecord::from_vec(&v).unwrap(), record);
        assert!(PatientRecord::from_vec(&v[..5]).is_err());
    }
}
