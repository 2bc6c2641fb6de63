//! # Performance Monitoring
//!
//! Named timers and throughput counters with their own retention policy,
//! independent of the metrics registry.
//!
//! Each operation name keeps a bounded FIFO of latency samples, a bounded
//! FIFO of throughput entries and at most one pending start time. One mutex
//! guards all three maps; every operation under it is an append or lookup.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::ObservabilityResult;
use crate::core::validation::validate_non_empty;
use crate::observability::stats::LatencyStats;
use crate::validation_error;

/// Configuration for the performance monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Latency samples kept per operation
    pub latency_history: usize,

    /// Throughput entries kept per operation
    pub throughput_history: usize,

    /// Window used by summaries
    pub throughput_window_seconds: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            latency_history: 1000,
            throughput_history: 100,
            throughput_window_seconds: 60,
        }
    }
}

/// Throughput over a trailing window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    /// Entries inside the window
    pub count: usize,
    /// Sum of their counts, saturating at `u64::MAX`
    pub total: u64,
    pub rate_per_second: f64,
}

/// Latency and throughput for every known operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub latency: BTreeMap<String, LatencyStats>,
    pub throughput: BTreeMap<String, ThroughputStats>,
}

#[derive(Debug, Clone, Copy)]
struct ThroughputEntry {
    at: Instant,
    count: u64,
}

#[derive(Debug, Default)]
struct MonitorState {
    pending: HashMap<String, Instant>,
    latencies: HashMap<String, VecDeque<f64>>,
    throughput: HashMap<String, VecDeque<ThroughputEntry>>,
}

/// Lightweight latency and throughput tracking
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    /// Start timing `operation_name`, replacing any pending start
    pub fn start_operation(&self, operation_name: &str) -> ObservabilityResult<()> {
        let name = validate_non_empty(operation_name, "operation_name")?;
        self.state.lock().pending.insert(name, Instant::now());
        Ok(())
    }

    /// Stop the timer and record the elapsed seconds.
    ///
    /// Without a matching start this logs a warning and returns `0.0`.
    pub fn end_operation(&self, operation_name: &str) -> ObservabilityResult<f64> {
        let name = validate_non_empty(operation_name, "operation_name")?;
        let mut state = self.state.lock();

        let Some(started) = state.pending.remove(&name) else {
            warn!(operation = %name, "Operation was not started");
            return Ok(0.0);
        };

        let elapsed = started.elapsed().as_secs_f64();
        let capacity = self.config.latency_history;
        let samples = state.latencies.entry(name).or_default();
        if samples.len() >= capacity {
            samples.pop_front();
        }
        samples.push_back(elapsed);
        Ok(elapsed)
    }

    /// Time the scope: the timer stops when the guard drops, including
    /// during unwinding
    pub fn measure(&self, operation_name: &str) -> ObservabilityResult<OperationTimer<'_>> {
        let name = validate_non_empty(operation_name, "operation_name")?;
        self.start_operation(&name)?;
        Ok(OperationTimer {
            monitor: self,
            name,
            _not_send: PhantomData,
        })
    }

    /// Closure form of [`PerformanceMonitor::measure`]
    pub fn time<F, R>(&self, operation_name: &str, f: F) -> ObservabilityResult<R>
    where
        F: FnOnce() -> R,
    {
        let _timer = self.measure(operation_name)?;
        Ok(f())
    }

    /// Record `count` completed units of work
    pub fn record_throughput(&self, operation_name: &str, count: u64) -> ObservabilityResult<()> {
        let name = validate_non_empty(operation_name, "operation_name")?;
        if count < 1 {
            return Err(validation_error!("count", "count must be at least 1, got {}", count));
        }

        let capacity = self.config.throughput_history;
        let mut state = self.state.lock();
        let entries = state.throughput.entry(name).or_default();
        if entries.len() >= capacity {
            entries.pop_front();
        }
        entries.push_back(ThroughputEntry {
            at: Instant::now(),
            count,
        });
        Ok(())
    }

    /// Stats over the retained latency samples; zeroed for unknown names
    pub fn get_latency_stats(&self, operation_name: &str) -> LatencyStats {
        let state = self.state.lock();
        state
            .latencies
            .get(operation_name.trim())
            .map(LatencyStats::from_samples)
            .unwrap_or_default()
    }

    /// Entries recorded within the trailing `window_seconds`
    pub fn get_throughput_stats(
        &self,
        operation_name: &str,
        window_seconds: u64,
    ) -> ObservabilityResult<ThroughputStats> {
        if window_seconds < 1 {
            return Err(validation_error!(
                "window_seconds",
                "window_seconds must be at least 1, got {}",
                window_seconds
            ));
        }

        let state = self.state.lock();
        Ok(state
            .throughput
            .get(operation_name.trim())
            .map(|entries| Self::window_stats(entries, Duration::from_secs(window_seconds)))
            .unwrap_or_default())
    }

    /// Names with a pending start
    pub fn pending_operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().pending.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stats for every operation that has samples, using the configured
    /// throughput window
    pub fn summary(&self) -> PerformanceSummary {
        let window = Duration::from_secs(self.config.throughput_window_seconds.max(1));
        let state = self.state.lock();

        PerformanceSummary {
            latency: state
                .latencies
                .iter()
                .map(|(name, samples)| (name.clone(), LatencyStats::from_samples(samples)))
                .collect(),
            throughput: state
                .throughput
                .iter()
                .map(|(name, entries)| (name.clone(), Self::window_stats(entries, window)))
                .collect(),
        }
    }

    fn window_stats(entries: &VecDeque<ThroughputEntry>, window: Duration) -> ThroughputStats {
        let now = Instant::now();
        let (count, total) = entries
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.at) <= window)
            .fold((0usize, 0u64), |(count, total), entry| {
                (count + 1, total.saturating_add(entry.count))
            });

        if count == 0 {
            return ThroughputStats::default();
        }

        ThroughputStats {
            count,
            total,
            rate_per_second: total as f64 / window.as_secs_f64(),
        }
    }
}

/// Ends its operation when dropped
#[must_use = "the timer stops as soon as it is dropped"]
pub struct OperationTimer<'a> {
    monitor: &'a PerformanceMonitor,
    name: String,
    _not_send: PhantomData<*const ()>,
}

impl OperationTimer<'_> {
    pub fn operation_name(&self) -> &str {
        &self.name
    }
}

impl Drop for OperationTimer<'_> {
    fn drop(&mut self) {
        // The name was validated when the timer was created
        let _ = self.monitor.end_operation(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_start_end_records_latency() {
        let monitor = PerformanceMonitor::default();
        monitor.start_operation("query").unwrap();
        sleep(Duration::from_millis(5));
        let elapsed = monitor.end_operation("query").unwrap();

        assert!(elapsed >= 0.005);
        let stats = monitor.get_latency_stats("query");
        assert_eq!(stats.count, 1);
        assert_eq!(stats.max, elapsed);
        assert!(monitor.pending_operations().is_empty());
    }

    #[test]
    fn test_end_without_start_returns_zero() {
        let monitor = PerformanceMonitor::default();
        assert_eq!(monitor.end_operation("unstarted").unwrap(), 0.0);
        assert_eq!(monitor.get_latency_stats("unstarted").count, 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let monitor = PerformanceMonitor::default();
        assert!(monitor.start_operation(" ").is_err());
        assert!(monitor.end_operation("").is_err());
        assert!(monitor.record_throughput("", 1).is_err());
    }

    #[test]
    fn test_latency_history_is_bounded() {
        let monitor = PerformanceMonitor::new(PerformanceConfig {
            latency_history: 3,
            ..PerformanceConfig::default()
        });
        for _ in 0..5 {
            monitor.start_operation("op").unwrap();
            monitor.end_operation("op").unwrap();
        }
        assert_eq!(monitor.get_latency_stats("op").count, 3);
    }

    #[test]
    fn test_measure_guard_and_closure() {
        let monitor = PerformanceMonitor::default();
        {
            let timer = monitor.measure("scoped").unwrap();
            assert_eq!(timer.operation_name(), "scoped");
            assert_eq!(monitor.pending_operations(), vec!["scoped".to_string()]);
        }
        let value = monitor.time("scoped", || 7).unwrap();

        assert_eq!(value, 7);
        assert_eq!(monitor.get_latency_stats("scoped").count, 2);
        assert!(monitor.pending_operations().is_empty());
    }

    #[test]
    fn test_measure_records_on_panic() {
        let monitor = PerformanceMonitor::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _timer = monitor.measure("fails").unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(monitor.get_latency_stats("fails").count, 1);
    }

    #[test]
    fn test_throughput_stats() {
        let monitor = PerformanceMonitor::default();
        monitor.record_throughput("ingest", 10).unwrap();
        monitor.record_throughput("ingest", 20).unwrap();
        assert!(monitor.record_throughput("ingest", 0).is_err());

        let stats = monitor.get_throughput_stats("ingest", 60).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total, 30);
        assert!((stats.rate_per_second - 0.5).abs() < 1e-12);

        assert!(monitor.get_throughput_stats("ingest", 0).is_err());
        assert_eq!(
            monitor.get_throughput_stats("unknown", 60).unwrap(),
            ThroughputStats::default()
        );
    }

    #[test]
    fn test_throughput_total_saturates() {
        let monitor = PerformanceMonitor::default();
        monitor.record_throughput("bulk", u64::MAX).unwrap();
        monitor.record_throughput("bulk", 1).unwrap();

        let stats = monitor.get_throughput_stats("bulk", 60).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total, u64::MAX);
        assert_eq!(monitor.summary().throughput["bulk"].total, u64::MAX);
    }

    #[test]
    fn test_throughput_history_is_bounded() {
        let monitor = PerformanceMonitor::new(PerformanceConfig {
            throughput_history: 2,
            ..PerformanceConfig::default()
        });
        for count in [1, 2, 3] {
            monitor.record_throughput("op", count).unwrap();
        }
        let stats = monitor.get_throughput_stats("op", 60).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total, 5);
    }

    #[test]
    fn test_summary_lists_every_operation() {
        let monitor = PerformanceMonitor::default();
        monitor.time("read", || ()).unwrap();
        monitor.record_throughput("write", 4).unwrap();

        let summary = monitor.summary();
        assert_eq!(summary.latency["read"].count, 1);
        assert_eq!(summary.throughput["write"].total, 4);
        assert!(!summary.latency.contains_key("write"));
    }
}
