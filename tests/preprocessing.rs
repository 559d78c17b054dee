use heart_risk_service::preprocessor::{Dataset, PreprocessError, Preprocessor};
use heart_risk_service::types::{PatientRecord, FEATURE_NAMES};
use serde_json::json;

const TRAINING_JSON: &str = r#"[
    {"age": 63, "sex": 1, "cp": 1, "trestbps": 145, "chol": 233, "fbs": 1, "restecg": 2,
     "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 3, "ca": 0, "thal": 6, "target": 0},
    {"age": 67, "sex": 1, "cp": 4, "trestbps": 160, "chol": 286, "fbs": 0, "restecg": 2,
     "thalach": 108, "exang": 1, "oldpeak": 1.5, "slope": 2, "ca": 3, "thal": 3, "target": 1},
    {"age": 37, "sex": 1, "cp": 3, "trestbps": 130, "chol": null, "fbs": 0, "restecg": 0,
     "thalach": 187, "exang": 0, "oldpeak": 3.5, "slope": 3, "ca": null, "thal": 3, "target": 0},
    {"age": 41, "sex": 0, "cp": 2, "trestbps": 130, "chol": 204, "fbs": 0, "restecg": 2,
     "thalach": 172, "exang": 0, "oldpeak": 1.4, "slope": 1, "ca": 0, "thal": 3, "target": 0}
]"#;

fn training_data() -> Dataset {
    let mut data = Dataset::from_json_str(TRAINING_JSON).unwrap();
    data.drop_column("target").unwrap();
    data
}

fn record() -> PatientRecord {
    PatientRecord::from_json(&json!({
        "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
        "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 3,
        "ca": 0, "thal": 6
    }))
    .unwrap()
}

#[test]
fn test_transform_before_fit_fails() {
    let preprocessor = Preprocessor::new();
    assert!(matches!(
        preprocessor.transform(&training_data()),
        Err(PreprocessError::NotFitted)
    ));
    assert!(matches!(
        preprocessor.transform_record(&record()),
        Err(PreprocessError::NotFitted)
    ));
}

#[test]
fn test_fit_then_transform_has_no_missing_values() {
    let data = training_data();
    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&data).unwrap();

    let out = preprocessor.transform(&data).unwrap();
    assert_eq!(out.len(), data.len());
    for row in &out {
        assert_eq!(row.len(), data.columns.len());
        assert!(row.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_transform_is_deterministic() {
    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&training_data()).unwrap();

    let first = preprocessor.transform_record(&record()).unwrap();
    let second = preprocessor.transform_record(&record()).unwrap();
    let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first), bits(&second));
}

#[test]
fn test_transform_reorders_by_column_name() {
    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&training_data()).unwrap();

    // fitted order comes from the JSON keys, records arrive in feature order
    let fitted = preprocessor.columns().unwrap().to_vec();
    assert_eq!(fitted.len(), FEATURE_NAMES.len());

    let by_record = preprocessor.transform_record(&record()).unwrap();
    let (columns, row): (Vec<String>, Vec<Option<f64>>) = fitted
        .iter()
        .map(|c| {
            let value = record()
                .named_values()
                .into_iter()
                .find(|(name, _)| name == c)
                .map(|(_, v)| v);
            (c.clone(), value)
        })
        .unzip();
    let by_table = preprocessor
        .transform(&Dataset::new(columns, vec![row]).unwrap())
        .unwrap();
    assert_eq!(by_record, by_table[0]);
}

#[test]
fn test_missing_column_is_schema_error() {
    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&training_data()).unwrap();

    let mut partial = training_data();
    partial.drop_column("thal").unwrap();
    match preprocessor.transform(&partial) {
        Err(PreprocessError::Schema { column }) => assert_eq!(column, "thal"),
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
fn test_refit_discards_previous_statistics() {
    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&training_data()).unwrap();

    let other = Dataset::from_csv_str("a,b\n1,2\n3,4\n").unwrap();
    preprocessor.fit(&other).unwrap();
    assert_eq!(preprocessor.columns().unwrap(), ["a".to_string(), "b".to_string()]);
    assert!(preprocessor.transform_record(&record()).is_err());
}

#[test]
fn test_artifact_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preprocessor.json");

    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&training_data()).unwrap();
    preprocessor.save(&path).unwrap();

    let loaded = Preprocessor::load(&path).unwrap();
    assert_eq!(loaded.stats(), preprocessor.stats());
    assert_eq!(
        loaded.transform_record(&record()).unwrap(),
        preprocessor.transform_record(&record()).unwrap()
    );
}

#[test]
fn test_saving_unfitted_preprocessor_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = Preprocessor::new().save(dir.path().join("p.json"));
    assert!(matches!(result, Err(PreprocessError::NotFitted)));
}
