//! Sample statistics shared by histograms and the performance monitor.

use serde::{Deserialize, Serialize};

/// Pick the value at `floor(p * len)`, clamped to the last element.
///
/// `sorted` must be ascending and non-empty.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Return a sorted copy of the sample
pub(crate) fn sorted_sample<'a, I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Latency statistics over a retained window of samples (seconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyStats {
    /// Compute stats over `samples`; zero-filled when empty
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let sorted = sorted_sample(samples);
        if sorted.is_empty() {
            return Self::default();
        }

        let sum: f64 = sorted.iter().sum();
        Self {
            count: sorted.len(),
            mean: sum / sorted.len() as f64,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        }
    }
}
