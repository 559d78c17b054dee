use heart_risk_service::config::AppConfig;
use heart_risk_service::http::{router, AppState};
use heart_risk_service::metrics::MetricsState;
use heart_risk_service::models::LogisticModel;
use heart_risk_service::pipeline::PredictionService;
use heart_risk_service::preprocessor::{Dataset, Preprocessor};
use heart_risk_service::types::{RiskLevel, FEATURE_NAMES};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const TRAINING_CSV: &str = "\
age,sex,cp,trestbps,chol,fbs,restecg,thalach,exang,oldpeak,slope,ca,thal,target
63,1,1,145,233,1,2,150,0,2.3,3,0,6,0
67,1,4,160,286,0,2,108,1,1.5,2,3,3,1
67,1,4,120,229,0,2,129,1,2.6,2,2,7,1
37,1,3,130,250,0,0,187,0,3.5,3,0,3,0
41,0,2,130,204,0,2,172,0,1.4,1,0,3,0
56,1,2,120,236,0,0,178,0,0.8,1,0,3,0
62,0,4,140,268,0,2,160,0,3.6,3,2,3,1
57,0,4,120,354,0,0,163,1,0.6,1,0,3,0
63,1,4,130,254,0,2,147,0,1.4,2,1,7,1
53,1,4,140,?,1,2,155,1,3.1,3,0,7,1
";

fn scenario_a() -> Value {
    json!({
        "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
        "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 3,
        "ca": 0, "thal": 6
    })
}

/// Fit and persist artifacts, then load them the way the binary does
fn ready_service(dir: &tempfile::TempDir) -> PredictionService {
    let mut data = Dataset::from_csv_str(TRAINING_CSV).unwrap();
    data.drop_column("target").unwrap();
    let mut preprocessor = Preprocessor::new();
    preprocessor.fit(&data).unwrap();

    let preprocessor_path = dir.path().join("preprocessor.json");
    preprocessor.save(&preprocessor_path).unwrap();

    let model_path = dir.path().join("best_model.json");
    LogisticModel::new(
        vec![0.3, 0.6, 0.8, 0.2, 0.1, 0.0, 0.2, -0.7, 0.6, 0.5, 0.4, 0.9, 0.7],
        -0.2,
    )
    .with_feature_names(FEATURE_NAMES.iter().map(|s| s.to_string()).collect())
    .save(&model_path)
    .unwrap();

    let mut config = AppConfig::default();
    config.artifacts.preprocessor_path = preprocessor_path;
    config.artifacts.model_path = model_path;
    config.pipeline.max_batch_size = 16;

    let service = PredictionService::load(&config, Arc::new(MetricsState::new()));
    assert!(service.is_ready());
    service
}

fn unavailable_service() -> PredictionService {
    let mut config = AppConfig::default();
    config.artifacts.preprocessor_path = "does/not/exist/preprocessor.json".into();
    config.artifacts.model_path = "does/not/exist/best_model.json".into();
    PredictionService::load(&config, Arc::new(MetricsState::new()))
}

async fn spawn(service: PredictionService) -> SocketAddr {
    let app = router(AppState::new(Arc::new(service)), true);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn send_raw(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    let req = match body {
        Some(body) => format!(
            "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ),
        None => format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"),
    };
    stream.write_all(req.as_bytes()).await.expect("write");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("status");
    (status, head.to_string(), body.to_string())
}

fn json_body(body: &str) -> Value {
    serde_json::from_str(body).expect("json body")
}

#[tokio::test]
async fn test_predict_scenario_a() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let (status, head, body) =
        send_raw(addr, "POST", "/predict", Some(&scenario_a().to_string())).await;
    assert_eq!(status, 200);
    assert!(head.to_ascii_lowercase().contains("x-request-id"));

    let body = json_body(&body);
    let prediction = body["prediction"].as_u64().unwrap();
    let probability = body["probability"].as_f64().unwrap();
    assert!(prediction <= 1);
    assert!((0.0..=1.0).contains(&probability));
    assert_eq!(
        body["risk_level"],
        RiskLevel::from_probability(probability).as_str()
    );
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_predict_scenario_b_reports_violations() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let input = json!({ "age": -10, "sex": 1, "cp": 3 }).to_string();
    let (status, _, body) = send_raw(addr, "POST", "/predict", Some(&input)).await;
    assert_eq!(status, 422);

    let body = json_body(&body);
    assert_eq!(body["error"]["kind"], "validation");
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"age"));
    assert!(fields.contains(&"thal"));
}

#[tokio::test]
async fn test_malformed_json_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let (status, _, body) = send_raw(addr, "POST", "/predict", Some("{\"age\": ")).await;
    assert_eq!(status, 422);
    assert_eq!(json_body(&body)["error"]["details"][0]["field"], "body");
}

#[tokio::test]
async fn test_batch_scenario_c() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let mut second = scenario_a();
    second["age"] = json!(45);
    second["thal"] = json!(3);
    let input = json!([scenario_a(), second]).to_string();

    let (status, _, body) = send_raw(addr, "POST", "/predict/batch", Some(&input)).await;
    assert_eq!(status, 200);

    let body = json_body(&body);
    assert_eq!(body["count"], 2);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 2);
    assert!(body["batch_latency"].as_f64().unwrap() > 0.0);

    // same record scores the same alone and in a batch
    let (_, _, single) = send_raw(addr, "POST", "/predict", Some(&scenario_a().to_string())).await;
    assert_eq!(
        json_body(&single)["probability"],
        body["predictions"][0]["probability"]
    );
}

#[tokio::test]
async fn test_batch_rejects_invalid_item_and_oversize() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let mut bad = scenario_a();
    bad["cp"] = json!(9);
    let input = json!([scenario_a(), bad]).to_string();
    let (status, _, body) = send_raw(addr, "POST", "/predict/batch", Some(&input)).await;
    assert_eq!(status, 422);
    assert_eq!(json_body(&body)["error"]["details"][0]["field"], "[1].cp");

    let oversize = Value::Array(vec![scenario_a(); 17]).to_string();
    let (status, _, _) = send_raw(addr, "POST", "/predict/batch", Some(&oversize)).await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_unavailable_scenario_d() {
    let addr = spawn(unavailable_service()).await;

    let (status, _, body) = send_raw(addr, "GET", "/health", None).await;
    assert_eq!(status, 503);
    let body = json_body(&body);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["preprocessor_loaded"], false);

    // no flapping: every call keeps answering unavailable
    for _ in 0..3 {
        let (status, _, body) =
            send_raw(addr, "POST", "/predict", Some(&scenario_a().to_string())).await;
        assert_eq!(status, 503);
        assert_eq!(json_body(&body)["error"]["kind"], "unavailable");
    }

    let input = json!([scenario_a(), scenario_a()]).to_string();
    let (status, _, _) = send_raw(addr, "POST", "/predict/batch", Some(&input)).await;
    assert_eq!(status, 503);

    let (_, _, metrics) = send_raw(addr, "GET", "/metrics", None).await;
    assert!(metrics.contains("api_health_status 0"));
    assert!(metrics.contains("prediction_requests_total 3"));
    assert!(metrics.contains("batch_prediction_requests_total 1"));
    assert!(metrics.contains("batch_prediction_size_count 1"));
    assert!(metrics.contains("prediction_latency_seconds_count 0"));
}

#[tokio::test]
async fn test_health_and_root_when_ready() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let (status, _, body) = send_raw(addr, "GET", "/health", None).await;
    assert_eq!(status, 200);
    let body = json_body(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["preprocessor_loaded"], true);

    let (status, _, body) = send_raw(addr, "GET", "/", None).await;
    assert_eq!(status, 200);
    let body = json_body(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["endpoints"]["predict_batch"], "/predict/batch");
}

#[tokio::test]
async fn test_metrics_exposition() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let (status, _, _) = send_raw(addr, "POST", "/predict", Some(&scenario_a().to_string())).await;
    assert_eq!(status, 200);
    let (status, _, _) = send_raw(addr, "POST", "/predict", Some("{}")).await;
    assert_eq!(status, 422);
    let (status, _, _) = send_raw(addr, "GET", "/no/such/route", None).await;
    assert_eq!(status, 404);
    let (_, _, _) = send_raw(addr, "GET", "/health", None).await;

    let (status, head, body) = send_raw(addr, "GET", "/metrics", None).await;
    assert_eq!(status, 200);
    assert!(head.contains("text/plain; version=0.0.4"));

    assert!(body.contains("# TYPE http_requests_total counter"));
    assert!(body.contains(
        "http_requests_total{method=\"POST\",endpoint=\"/predict\",status=\"200\"} 1"
    ));
    assert!(body.contains(
        "http_requests_total{method=\"POST\",endpoint=\"/predict\",status=\"422\"} 1"
    ));
    assert!(body.contains(
        "http_requests_total{method=\"GET\",endpoint=\"unmatched\",status=\"404\"} 1"
    ));
    assert!(body.contains("prediction_requests_total 1"));
    assert!(body.contains("prediction_latency_seconds_count 1"));
    assert!(body.contains("prediction_errors_total{kind=\"validation\"} 1"));
    assert!(body.contains("api_health_status 1"));
    assert!(body.contains("# TYPE api_memory_usage_bytes gauge"));
}

#[tokio::test]
async fn test_accepts_thal_codes_outside_cleveland_set() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(ready_service(&dir)).await;

    let input = json!({
        "age": 37, "sex": 1, "cp": 2, "trestbps": 130, "chol": 250, "fbs": 0,
        "restecg": 1, "thalach": 187, "exang": 0, "oldpeak": 3.5, "slope": 1,
        "ca": 0, "thal": 2
    })
    .to_string();
    let (status, _, body) = send_raw(addr, "POST", "/predict", Some(&input)).await;
    assert_eq!(status, 200);
    assert!(json_body(&body)["risk_level"].is_string());
}
