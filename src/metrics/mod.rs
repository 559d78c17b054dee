//! Service metrics and their Prometheus text exposition.
//!
//! One `MetricsState` is created at startup and shared by every request
//! handler. Counters are atomics; labeled families and histograms are
//! updated under a short lock so a reader never sees half an observation.

pub mod histogram;
pub mod process;

use crate::types::prediction::RiskLevel;
use histogram::{Histogram, HistogramSnapshot, BATCH_SIZE_BUCKETS, LATENCY_BUCKETS};
use parking_lot::Mutex;
use process::{ProcessSampler, ResourceSample};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Minimum spacing between procfs resource samples
pub const RESOURCE_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Content type of the exposition format
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// f64 gauge stored as raw bits
#[derive(Default)]
struct Gauge(AtomicU64);

impl Gauge {
    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

type HttpKey = (String, String, u16);
type RouteKey = (String, String);

/// Process-wide metrics for the prediction service
pub struct MetricsState {
    /// Validated `/predict` requests, whatever their outcome
    pub prediction_requests: AtomicU64,
    /// Validated `/predict/batch` requests, whatever their outcome
    pub batch_requests: AtomicU64,
    predictions_by_class: [AtomicU64; 2],
    predictions_by_risk: [AtomicU64; 3],
    prediction_errors: Mutex<BTreeMap<String, u64>>,
    http_requests: Mutex<BTreeMap<HttpKey, u64>>,
    http_latency: Mutex<BTreeMap<RouteKey, HistogramSnapshot>>,
    prediction_latency: Histogram,
    batch_size: Histogram,
    batch_latency: Histogram,
    cpu_percent: Gauge,
    memory_bytes: Gauge,
    memory_percent: Gauge,
    health: Gauge,
    sampler: ProcessSampler,
    last_resource_sample: Mutex<Option<Instant>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl MetricsState {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            prediction_requests: AtomicU64::new(0),
            batch_requests: AtomicU64::new(0),
            predictions_by_class: [AtomicU64::new(0), AtomicU64::new(0)],
            predictions_by_risk: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            prediction_errors: Mutex::new(BTreeMap::new()),
            http_requests: Mutex::new(BTreeMap::new()),
            http_latency: Mutex::new(BTreeMap::new()),
            prediction_latency: Histogram::new(LATENCY_BUCKETS),
            batch_size: Histogram::new(BATCH_SIZE_BUCKETS),
            batch_latency: Histogram::new(LATENCY_BUCKETS),
            cpu_percent: Gauge::default(),
            memory_bytes: Gauge::default(),
            memory_percent: Gauge::default(),
            health: Gauge::default(),
            sampler: ProcessSampler::new(),
            last_resource_sample: Mutex::new(None),
            start_time: Instant::now(),
        }
    }

    /// Record one finished HTTP request, whatever its outcome
    pub fn record_http_request(&self, method: &str, endpoint: &str, status: u16, latency: Duration) {
        *self
            .http_requests
            .lock()
            .entry((method.to_string(), endpoint.to_string(), status))
            .or_insert(0) += 1;

        self.http_latency
            .lock()
            .entry((method.to_string(), endpoint.to_string()))
            .or_insert_with(|| HistogramSnapshot::empty(LATENCY_BUCKETS))
            .observe(latency.as_secs_f64());
    }

    /// Count a single-prediction request that passed validation
    pub fn record_prediction_request(&self) {
        self.prediction_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one successful prediction, single or batch item
    pub fn record_prediction(&self, prediction: u8, risk_level: RiskLevel, latency: Duration) {
        self.predictions_by_class[usize::from(prediction.min(1))].fetch_add(1, Ordering::Relaxed);
        self.predictions_by_risk[risk_index(risk_level)].fetch_add(1, Ordering::Relaxed);
        self.prediction_latency.observe(latency.as_secs_f64());
    }

    /// Count a validated batch request and its size, before availability is known
    pub fn record_batch_request(&self, size: usize) {
        self.batch_requests.fetch_add(1, Ordering::Relaxed);
        self.batch_size.observe(size as f64);
    }

    /// Record the wall-clock span of a scored batch
    pub fn record_batch_latency(&self, latency: Duration) {
        self.batch_latency.observe(latency.as_secs_f64());
    }

    /// Record a failed prediction by error kind
    pub fn record_prediction_error(&self, kind: &str) {
        *self
            .prediction_errors
            .lock()
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    pub fn set_health(&self, healthy: bool) {
        self.health.set(if healthy { 1.0 } else { 0.0 });
    }

    pub fn health(&self) -> f64 {
        self.health.get()
    }

    /// Refresh the CPU/memory gauges at most once per `RESOURCE_SAMPLE_INTERVAL`.
    ///
    /// Returns whether procfs was read. Unreadable values are skipped.
    pub fn sample_resources(&self) -> bool {
        let now = Instant::now();
        {
            let mut last = self.last_resource_sample.lock();
            if matches!(*last, Some(at) if now.duration_since(at) < RESOURCE_SAMPLE_INTERVAL) {
                return false;
            }
            *last = Some(now);
        }
        if let Some(sample) = self.sampler.sample() {
            self.record_resources(&sample);
        }
        true
    }

    pub fn record_resources(&self, sample: &ResourceSample) {
        self.cpu_percent.set(sample.cpu_percent);
        self.memory_bytes.set(sample.rss_bytes as f64);
        if let Some(percent) = sample.memory_percent {
            self.memory_percent.set(percent);
        }
    }

    pub fn predictions_for_class(&self, prediction: u8) -> u64 {
        self.predictions_by_class[usize::from(prediction.min(1))].load(Ordering::Relaxed)
    }

    pub fn predictions_for_risk(&self, risk_level: RiskLevel) -> u64 {
        self.predictions_by_risk[risk_index(risk_level)].load(Ordering::Relaxed)
    }

    /// Total HTTP requests seen for an endpoint, across methods and statuses
    pub fn http_requests_for(&self, endpoint: &str) -> u64 {
        self.http_requests
            .lock()
            .iter()
            .filter(|((_, e, _), _)| e == endpoint)
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn prediction_latency(&self) -> HistogramSnapshot {
        self.prediction_latency.snapshot()
    }

    /// Scored predictions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.prediction_latency.snapshot().count as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Render every metric in the Prometheus text format
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        let http_requests = self.http_requests.lock().clone();
        write_header(&mut out, "http_requests_total", "Total HTTP requests", "counter");
        for ((method, endpoint, status), count) in &http_requests {
            let labels = format!(
                "method=\"{}\",endpoint=\"{}\",status=\"{}\"",
                escape(method),
                escape(endpoint),
                status
            );
            let _ = writeln!(out, "http_requests_total{{{labels}}} {count}");
        }

        let http_latency = self.http_latency.lock().clone();
        write_header(
            &mut out,
            "http_request_duration_seconds",
            "HTTP request latency",
            "histogram",
        );
        for ((method, endpoint), snapshot) in &http_latency {
            let labels = format!("method=\"{}\",endpoint=\"{}\"", escape(method), escape(endpoint));
            write_histogram(&mut out, "http_request_duration_seconds", &labels, snapshot);
        }

        write_header(
            &mut out,
            "prediction_requests_total",
            "Total prediction requests",
            "counter",
        );
        let _ = writeln!(
            out,
            "prediction_requests_total {}",
            self.prediction_requests.load(Ordering::Relaxed)
        );

        write_header(&mut out, "predictions_by_class", "Predictions by class", "counter");
        for class in 0..=1u8 {
            let _ = writeln!(
                out,
                "predictions_by_class{{prediction=\"{class}\"}} {}",
                self.predictions_for_class(class)
            );
        }

        write_header(
            &mut out,
            "prediction_results_total",
            "Total predictions by result",
            "counter",
        );
        for class in 0..=1u8 {
            let _ = writeln!(
                out,
                "prediction_results_total{{result=\"{class}\"}} {}",
                self.predictions_for_class(class)
            );
        }

        write_header(
            &mut out,
            "prediction_risk_level_total",
            "Predictions by risk level",
            "counter",
        );
        for level in RiskLevel::all() {
            let _ = writeln!(
                out,
                "prediction_risk_level_total{{risk_level=\"{level}\"}} {}",
                self.predictions_for_risk(level)
            );
        }

        let errors = self.prediction_errors.lock().clone();
        write_header(
            &mut out,
            "prediction_errors_total",
            "Failed predictions by error kind",
            "counter",
        );
        for (kind, count) in &errors {
            let _ = writeln!(out, "prediction_errors_total{{kind=\"{}\"}} {count}", escape(kind));
        }

        write_header(
            &mut out,
            "prediction_latency_seconds",
            "Prediction latency",
            "histogram",
        );
        write_histogram(&mut out, "prediction_latency_seconds", "", &self.prediction_latency.snapshot());

        write_header(
            &mut out,
            "batch_prediction_requests_total",
            "Total batch prediction requests",
            "counter",
        );
        let _ = writeln!(
            out,
            "batch_prediction_requests_total {}",
            self.batch_requests.load(Ordering::Relaxed)
        );

        write_header(&mut out, "batch_prediction_size", "Batch prediction size", "histogram");
        write_histogram(&mut out, "batch_prediction_size", "", &self.batch_size.snapshot());

        write_header(
            &mut out,
            "batch_prediction_latency_seconds",
            "Batch prediction latency",
            "histogram",
        );
        write_histogram(
            &mut out,
            "batch_prediction_latency_seconds",
            "",
            &self.batch_latency.snapshot(),
        );

        for (name, help, value) in [
            ("api_cpu_usage_percent", "CPU usage percentage", self.cpu_percent.get()),
            ("api_memory_usage_bytes", "Memory usage in bytes", self.memory_bytes.get()),
            (
                "api_memory_usage_percent",
                "Memory usage percentage",
                self.memory_percent.get(),
            ),
            (
                "api_health_status",
                "API health status (1=healthy, 0=unhealthy)",
                self.health.get(),
            ),
        ] {
            write_header(&mut out, name, help, "gauge");
            let _ = writeln!(out, "{name} {value}");
        }

        out
    }

    /// Log summary statistics
    pub fn log_summary(&self) {
        let requests = self.prediction_requests.load(Ordering::Relaxed);
        let batches = self.batch_requests.load(Ordering::Relaxed);
        let latency = self.prediction_latency.snapshot();
        let errors: u64 = self.prediction_errors.lock().values().sum();

        info!(
            requests = requests,
            predictions = latency.count,
            batches = batches,
            errors = errors,
            throughput = format!("{:.2} pred/s", self.get_throughput()),
            mean_latency_ms = format!("{:.3}", latency.mean() * 1000.0),
            "Metrics summary"
        );
        info!(
            low = self.predictions_for_risk(RiskLevel::Low),
            medium = self.predictions_for_risk(RiskLevel::Medium),
            high = self.predictions_for_risk(RiskLevel::High),
            positive = self.predictions_for_class(1),
            negative = self.predictions_for_class(0),
            "Predictions by risk level"
        );
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

fn risk_index(level: RiskLevel) -> usize {
    match level {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn write_histogram(out: &mut String, name: &str, labels: &str, snapshot: &HistogramSnapshot) {
    let sep = if labels.is_empty() { "" } else { "," };
    for (bound, count) in snapshot.bounds.iter().zip(&snapshot.buckets) {
        let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {count}");
    }
    let _ = writeln!(
        out,
        "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {}",
        snapshot.count
    );
    if labels.is_empty() {
        let _ = writeln!(out, "{name}_sum {}", snapshot.sum);
        let _ = writeln!(out, "{name}_count {}", snapshot.count);
    } else {
        let _ = writeln!(out, "{name}_sum{{{labels}}} {}", snapshot.sum);
        let _ = writeln!(out, "{name}_count{{{labels}}} {}", snapshot.count);
    }
}

/// Periodic metrics logger
pub struct MetricsReporter {
    metrics: Arc<MetricsState>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<MetricsState>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        if self.interval_secs == 0 {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}
