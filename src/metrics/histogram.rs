//! Fixed-bucket histograms

use parking_lot::Mutex;

/// Default latency buckets, in seconds
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Batch size buckets, in records
pub const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Point-in-time copy of a histogram
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub bounds: &'static [f64],
    /// Cumulative count of observations `<= bounds[i]`
    pub buckets: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

impl HistogramSnapshot {
    pub fn empty(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            buckets: vec![0; bounds.len()],
            sum: 0.0,
            count: 0,
        }
    }

    /// Add one observation
    pub fn observe(&mut self, value: f64) {
        for (bound, bucket) in self.bounds.iter().zip(self.buckets.iter_mut()) {
            if value <= *bound {
                *bucket += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Histogram whose observations are applied atomically under one lock
pub struct Histogram {
    inner: Mutex<HistogramSnapshot>,
}

impl Histogram {
    pub fn new(bounds: &'static [f64]) -> Self {
        Self {
            inner: Mutex::new(HistogramSnapshot::empty(bounds)),
        }
    }

    pub fn observe(&self, value: f64) {
        self.inner.lock().observe(value);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.inner.lock().clone()
    }
}
