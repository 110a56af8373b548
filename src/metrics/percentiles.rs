use hdrhistogram::Histogram;
use serde::Serialize;

/// Distribution of per-tick pause deltas for one collector, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PauseDistribution {
    /// Number of ticks that observed a non-zero delta.
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub p999_ms: u64,
}

impl PauseDistribution {
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            count: hist.len(),
            min_ms: hist.min(),
            max_ms: hist.max(),
            mean_ms: hist.mean(),
            p50_ms: hist.value_at_quantile(0.50),
            p95_ms: hist.value_at_quantile(0.95),
            p99_ms: hist.value_at_quantile(0.99),
            p999_ms: hist.value_at_quantile(0.999),
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            min_ms: 0,
            max_ms: 0,
            mean_ms: 0.0,
            p50_ms: 0,
            p95_ms: 0,
            p99_ms: 0,
            p999_ms: 0,
        }
    }
}
