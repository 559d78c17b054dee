//! Process CPU and memory sampling from procfs

use parking_lot::Mutex;
use std::fs;
use std::time::Instant;

/// Kernel clock ticks per second (USER_HZ)
const CLOCK_TICKS: f64 = 100.0;

/// One resource reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// CPU usage since the previous sample, percent of one core
    pub cpu_percent: f64,
    /// Resident set size
    pub rss_bytes: u64,
    /// RSS as a share of total system memory
    pub memory_percent: Option<f64>,
}

/// Samples this process's resource usage.
///
/// CPU usage is the delta between consecutive calls, so the first sample
/// reports 0.0.
pub struct ProcessSampler {
    last_cpu: Mutex<Option<(Instant, f64)>>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            last_cpu: Mutex::new(None),
        }
    }

    /// Read current usage; `None` when procfs is unavailable
    pub fn sample(&self) -> Option<ResourceSample> {
        if !cfg!(target_os = "linux") {
            return None;
        }

        let cpu_seconds = read_cpu_seconds()?;
        let rss_bytes = read_rss_bytes()?;
        let now = Instant::now();

        let cpu_percent = {
            let mut last = self.last_cpu.lock();
            let percent = match *last {
                Some((at, prev)) => {
                    let wall = now.duration_since(at).as_secs_f64();
                    if wall > 0.0 {
                        ((cpu_seconds - prev) / wall * 100.0).max(0.0)
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
            *last = Some((now, cpu_seconds));
            percent
        };

        let memory_percent = read_total_memory_bytes()
            .filter(|total| *total > 0)
            .map(|total| rss_bytes as f64 / total as f64 * 100.0);

        Some(ResourceSample {
            cpu_percent,
            rss_bytes,
            memory_percent,
        })
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// utime + stime from /proc/self/stat, in seconds
fn read_cpu_seconds() -> Option<f64> {
    let stat = fs::read_to_string("/proc/self/stat").ok()?;
    parse_cpu_seconds(&stat)
}

fn parse_cpu_seconds(stat: &str) -> Option<f64> {
    // comm may contain spaces; fields resume after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime = fields.get(11)?.parse::<u64>().ok()?;
    let stime = fields.get(12)?.parse::<u64>().ok()?;
    Some((utime + stime) as f64 / CLOCK_TICKS)
}

fn read_rss_bytes() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    parse_kb_field(&status, "VmRSS:")
}

fn read_total_memory_bytes() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    parse_kb_field(&meminfo, "MemTotal:")
}

fn parse_kb_field(text: &str, key: &str) -> Option<u64> {
    text.lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}
