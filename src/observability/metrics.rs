//! # Metrics Collection
//!
//! In-process counters, gauges and histograms, owned by a [`MetricsRegistry`].
//!
//! ## Identity
//! A time series is identified by its name plus the *label signature*: the
//! label set rendered as `key=value` pairs, sorted by key and joined with `,`.
//! Labels are fixed when the metric is created.
//!
//! ## Locking
//! The registry lock only guards creation and lookup. Each metric carries its
//! own mutex, so incrementing a counter never touches the registry lock.
//!
//! ## Usage Example
//! ```rust
//! use sdk_observability::observability::metrics::{labels, MetricsRegistry};
//!
//! let registry = MetricsRegistry::default();
//! let requests = registry
//!     .get_or_create_counter("requests_total", "Handled requests", labels([("method", "GET")]))
//!     .unwrap();
//! requests.inc();
//! assert_eq!(requests.get(), 1.0);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::ObservabilityResult;
use crate::core::validation::{validate_buckets, validate_name, validate_non_negative};

/// Default histogram bucket boundaries (seconds)
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Number of raw observations a histogram keeps for percentile computation
pub const DEFAULT_HISTOGRAM_CAPACITY: usize = 10_000;

/// Longest accepted metric name
pub const MAX_METRIC_NAME_LENGTH: usize = 200;

/// Summary key used for metrics without labels
pub const DEFAULT_LABEL_KEY: &str = "default";

/// Label set of a metric; a `BTreeMap` keeps keys sorted
pub type Labels = BTreeMap<String, String>;

/// Build a label set from `(key, value)` pairs
pub fn labels<I, K, V>(pairs: I) -> Labels
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Canonical, order-independent rendering of a label set
pub fn label_signature(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Configuration for metrics collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Buckets used when a histogram is created without explicit ones
    pub default_buckets: Vec<f64>,

    /// Raw observations retained per histogram
    pub histogram_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            default_buckets: DEFAULT_BUCKETS.to_vec(),
            histogram_capacity: DEFAULT_HISTOGRAM_CAPACITY,
        }
    }
}

/// Types of metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
        };
        f.write_str(name)
    }
}

/// Identity and metadata shared by every metric type
#[derive(Debug, Clone)]
struct MetricMeta {
    name: String,
    description: String,
    labels: Labels,
    signature: String,
    created_at: DateTime<Utc>,
}

impl MetricMeta {
    fn new(name: &str, description: &str, labels: Labels) -> ObservabilityResult<Self> {
        let name = validate_name(name, "name", 1, Some(MAX_METRIC_NAME_LENGTH))?;
        let signature = label_signature(&labels);
        Ok(Self {
            name,
            description: description.to_string(),
            labels,
            signature,
            created_at: Utc::now(),
        })
    }
}

macro_rules! metric_accessors {
    ($($ty:ty),+) => {$(
        impl $ty {
            /// Metric name
            pub fn name(&self) -> &str {
                &self.meta.name
            }

            /// Help text supplied at registration
            pub fn description(&self) -> &str {
                &self.meta.description
            }

            /// Immutable label set
            pub fn labels(&self) -> &Labels {
                &self.meta.labels
            }

            /// Canonical label signature
            pub fn label_signature(&self) -> &str {
                &self.meta.signature
            }

            /// Creation time
            pub fn created_at(&self) -> DateTime<Utc> {
                self.meta.created_at
            }
        }
    )+};
}

/// Monotonically non-decreasing value
#[derive(Debug)]
pub struct Counter {
    meta: MetricMeta,
    value: Mutex<f64>,
}

impl Counter {
    pub fn new(name: &str, description: &str, labels: Labels) -> ObservabilityResult<Self> {
        Ok(Self {
            meta: MetricMeta::new(name, description, labels)?,
            value: Mutex::new(0.0),
        })
    }

    /// Increment by one
    pub fn inc(&self) {
        *self.value.lock() += 1.0;
    }

    /// Increment by `value`; negative increments are rejected and leave the
    /// counter untouched
    pub fn inc_by(&self, value: f64) -> ObservabilityResult<()> {
        validate_non_negative(value, "value", "Counter cannot be decremented")?;
        *self.value.lock() += value;
        Ok(())
    }

    pub fn get(&self) -> f64 {
        *self.value.lock()
    }

    pub fn reset(&self) {
        *self.value.lock() = 0.0;
    }
}

/// Value that can go up and down
#[derive(Debug)]
pub struct Gauge {
    meta: MetricMeta,
    value: Mutex<f64>,
}

impl Gauge {
    pub fn new(name: &str, description: &str, labels: Labels) -> ObservabilityResult<Self> {
        Ok(Self {
            meta: MetricMeta::new(name, description, labels)?,
            value: Mutex::new(0.0),
        })
    }

    pub fn inc(&self) {
        self.inc_by(1.0);
    }

    pub fn inc_by(&self, value: f64) {
        *self.value.lock() += value;
    }

    pub fn dec(&self) {
        self.dec_by(1.0);
    }

    pub fn dec_by(&self, value: f64) {
        *self.value.lock() -= value;
    }

    pub fn set(&self, value: f64) {
        *self.value.lock() = value;
    }

    pub fn get(&self) -> f64 {
        *self.value.lock()
    }
}

/// Number of retained observations that fell into one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    /// Upper boundary (inclusive)
    pub le: f64,
    pub count: u64,
}

/// Point-in-time view of a histogram.
///
/// `count`, `sum` and `mean` cover every observation ever recorded; `min`,
/// `max`, the percentiles and the bucket counts only cover the retained
/// window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    /// Observations currently retained for percentile computation
    pub retained: usize,
    pub buckets: Vec<BucketCount>,
}

#[derive(Debug, Default)]
struct HistogramState {
    observations: VecDeque<f64>,
    sum: f64,
    count: u64,
}

/// Distribution of non-negative observations
#[derive(Debug)]
pub struct Histogram {
    meta: MetricMeta,
    buckets: Vec<f64>,
    capacity: usize,
    state: Mutex<HistogramState>,
}

impl Histogram {
    /// Create a histogram; `None` buckets means [`DEFAULT_BUCKETS`]
    pub fn new(
        name: &str,
        description: &str,
        labels: Labels,
        buckets: Option<Vec<f64>>,
    ) -> ObservabilityResult<Self> {
        Self::with_capacity(name, description, labels, buckets, DEFAULT_HISTOGRAM_CAPACITY)
    }

    pub fn with_capacity(
        name: &str,
        description: &str,
        labels: Labels,
        buckets: Option<Vec<f64>>,
        capacity: usize,
    ) -> ObservabilityResult<Self> {
        let buckets = buckets.unwrap_or_else(|| DEFAULT_BUCKETS.to_vec());
        validate_buckets(&buckets)?;
        if capacity == 0 {
            return Err(crate::validation_error!("capacity", "histogram capacity must be positive"));
        }

        Ok(Self {
            meta: MetricMeta::new(name, description, labels)?,
            buckets,
            capacity,
            state: Mutex::new(HistogramState {
                observations: VecDeque::with_capacity(capacity.min(1024)),
                ..HistogramState::default()
            }),
        })
    }

    /// Bucket boundaries, ascending
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Record one observation, evicting the oldest retained one at capacity
    pub fn observe(&self, value: f64) -> ObservabilityResult<()> {
        validate_non_negative(value, "value", "Histogram value cannot be negative")?;

        let mut state = self.state.lock();
        if state.observations.len() == self.capacity {
            state.observations.pop_front();
        }
        state.observations.push_back(value);
        state.sum += value;
        state.count += 1;
        Ok(())
    }

    pub fn get(&self) -> HistogramSnapshot {
        let (sorted, sum, count) = {
            let state = self.state.lock();
            (
                super::stats::sorted_sample(state.observations.iter()),
                state.sum,
                state.count,
            )
        };

        let mut buckets: Vec<BucketCount> = self
            .buckets
            .iter()
            .map(|&le| BucketCount { le, count: 0 })
            .collect();

        if sorted.is_empty() {
            return HistogramSnapshot {
                count: 0,
                sum: 0.0,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                p50: 0.0,
                p95: 0.0,
                p99: 0.0,
                retained: 0,
                buckets,
            };
        }

        // Each observation lands in the first boundary it fits under; values
        // above the last boundary are not counted.
        for value in &sorted {
            if let Some(bucket) = buckets.iter_mut().find(|b| *value <= b.le) {
                bucket.count += 1;
            }
        }

        HistogramSnapshot {
            count,
            sum,
            mean: if count > 0 { sum / count as f64 } else { 0.0 },
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: super::stats::percentile(&sorted, 0.50),
            p95: super::stats::percentile(&sorted, 0.95),
            p99: super::stats::percentile(&sorted, 0.99),
            retained: sorted.len(),
            buckets,
        }
    }
}

metric_accessors!(Counter, Gauge, Histogram);

/// Current value of one series, as reported in summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Value(f64),
    Histogram(HistogramSnapshot),
}

/// Shared handle to a registered metric
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
}

impl Metric {
    pub fn metric_type(&self) -> MetricType {
        match self {
            Metric::Counter(_) => MetricType::Counter,
            Metric::Gauge(_) => MetricType::Gauge,
            Metric::Histogram(_) => MetricType::Histogram,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::Counter(m) => m.name(),
            Metric::Gauge(m) => m.name(),
            Metric::Histogram(m) => m.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Metric::Counter(m) => m.description(),
            Metric::Gauge(m) => m.description(),
            Metric::Histogram(m) => m.description(),
        }
    }

    pub fn labels(&self) -> &Labels {
        match self {
            Metric::Counter(m) => m.labels(),
            Metric::Gauge(m) => m.labels(),
            Metric::Histogram(m) => m.labels(),
        }
    }

    pub fn label_signature(&self) -> &str {
        match self {
            Metric::Counter(m) => m.label_signature(),
            Metric::Gauge(m) => m.label_signature(),
            Metric::Histogram(m) => m.label_signature(),
        }
    }

    pub fn value(&self) -> MetricValue {
        match self {
            Metric::Counter(m) => MetricValue::Value(m.get()),
            Metric::Gauge(m) => MetricValue::Value(m.get()),
            Metric::Histogram(m) => MetricValue::Histogram(m.get()),
        }
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Metric::Counter(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            Metric::Gauge(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Metric::Histogram(m) => Some(m),
            _ => None,
        }
    }
}

/// `name -> label signature -> value`
pub type MetricsSummary = BTreeMap<String, BTreeMap<String, MetricValue>>;

/// One series with its full label set, for exporters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSample {
    pub name: String,
    pub description: String,
    pub metric_type: MetricType,
    pub labels: Labels,
    pub value: MetricValue,
}

/// `name -> label signature -> handle`
pub type MetricTable = HashMap<String, HashMap<String, Metric>>;

/// Single authority mapping `(name, label signature)` to a live metric
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    config: MetricsConfig,
    metrics: RwLock<MetricTable>,
}

impl MetricsRegistry {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Create a new counter, replacing whatever was registered under the
    /// same signature
    pub fn register_counter(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
    ) -> ObservabilityResult<Arc<Counter>> {
        let counter = Arc::new(Counter::new(name, description, labels)?);
        self.insert(Metric::Counter(counter.clone()));
        Ok(counter)
    }

    /// Create a new gauge, replacing whatever was registered under the same
    /// signature
    pub fn register_gauge(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
    ) -> ObservabilityResult<Arc<Gauge>> {
        let gauge = Arc::new(Gauge::new(name, description, labels)?);
        self.insert(Metric::Gauge(gauge.clone()));
        Ok(gauge)
    }

    /// Create a new histogram, replacing whatever was registered under the
    /// same signature. `None` buckets falls back to the configured defaults.
    pub fn register_histogram(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
        buckets: Option<Vec<f64>>,
    ) -> ObservabilityResult<Arc<Histogram>> {
        let histogram = Arc::new(self.build_histogram(name, description, labels, buckets)?);
        self.insert(Metric::Histogram(histogram.clone()));
        Ok(histogram)
    }

    pub fn get_or_create_counter(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
    ) -> ObservabilityResult<Arc<Counter>> {
        if let Some(Metric::Counter(counter)) = self.get_metric(name, &labels) {
            return Ok(counter);
        }

        let candidate = Counter::new(name, description, labels)?;
        let mut metrics = self.metrics.write();
        if let Some(existing) = Self::lookup(&metrics, &candidate.meta.name, &candidate.meta.signature) {
            if let Metric::Counter(counter) = existing {
                return Ok(counter.clone());
            }
            Self::warn_type_mismatch(existing, MetricType::Counter);
        }

        let counter = Arc::new(candidate);
        Self::insert_locked(&mut metrics, Metric::Counter(counter.clone()));
        Ok(counter)
    }

    pub fn get_or_create_gauge(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
    ) -> ObservabilityResult<Arc<Gauge>> {
        if let Some(Metric::Gauge(gauge)) = self.get_metric(name, &labels) {
            return Ok(gauge);
        }

        let candidate = Gauge::new(name, description, labels)?;
        let mut metrics = self.metrics.write();
        if let Some(existing) = Self::lookup(&metrics, &candidate.meta.name, &candidate.meta.signature) {
            if let Metric::Gauge(gauge) = existing {
                return Ok(gauge.clone());
            }
            Self::warn_type_mismatch(existing, MetricType::Gauge);
        }

        let gauge = Arc::new(candidate);
        Self::insert_locked(&mut metrics, Metric::Gauge(gauge.clone()));
        Ok(gauge)
    }

    /// Buckets are only validated and used when a new histogram has to be
    /// created
    pub fn get_or_create_histogram(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
        buckets: Option<Vec<f64>>,
    ) -> ObservabilityResult<Arc<Histogram>> {
        if let Some(Metric::Histogram(histogram)) = self.get_metric(name, &labels) {
            return Ok(histogram);
        }

        let candidate = self.build_histogram(name, description, labels, buckets)?;
        let mut metrics = self.metrics.write();
        if let Some(existing) = Self::lookup(&metrics, &candidate.meta.name, &candidate.meta.signature) {
            if let Metric::Histogram(histogram) = existing {
                return Ok(histogram.clone());
            }
            Self::warn_type_mismatch(existing, MetricType::Histogram);
        }

        let histogram = Arc::new(candidate);
        Self::insert_locked(&mut metrics, Metric::Histogram(histogram.clone()));
        Ok(histogram)
    }

    /// Look up a metric; unknown or malformed names yield `None`
    pub fn get_metric(&self, name: &str, labels: &Labels) -> Option<Metric> {
        let metrics = self.metrics.read();
        Self::lookup(&metrics, name.trim(), &label_signature(labels)).cloned()
    }

    /// Snapshot of every registered handle, grouped by name then signature
    pub fn get_all_metrics(&self) -> MetricTable {
        self.metrics.read().clone()
    }

    /// Current value of every series
    pub fn summary(&self) -> MetricsSummary {
        let metrics = self.get_all_metrics();
        metrics
            .into_iter()
            .map(|(name, series)| {
                let values = series
                    .into_iter()
                    .map(|(signature, metric)| {
                        let key = if signature.is_empty() {
                            DEFAULT_LABEL_KEY.to_string()
                        } else {
                            signature
                        };
                        (key, metric.value())
                    })
                    .collect();
                (name, values)
            })
            .collect()
    }

    /// Every series with its labels, ordered by name then signature
    pub fn samples(&self) -> Vec<SeriesSample> {
        let mut handles: Vec<Metric> = self
            .metrics
            .read()
            .values()
            .flat_map(|series| series.values().cloned())
            .collect();
        handles.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.label_signature().cmp(b.label_signature()))
        });

        handles
            .into_iter()
            .map(|metric| SeriesSample {
                name: metric.name().to_string(),
                description: metric.description().to_string(),
                metric_type: metric.metric_type(),
                labels: metric.labels().clone(),
                value: metric.value(),
            })
            .collect()
    }

    /// Number of registered series
    pub fn len(&self) -> usize {
        self.metrics.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered metric
    pub fn clear(&self) {
        self.metrics.write().clear();
        debug!("Metrics registry cleared");
    }

    fn build_histogram(
        &self,
        name: &str,
        description: &str,
        labels: Labels,
        buckets: Option<Vec<f64>>,
    ) -> ObservabilityResult<Histogram> {
        let buckets = buckets.unwrap_or_else(|| self.config.default_buckets.clone());
        Histogram::with_capacity(name, description, labels, Some(buckets), self.config.histogram_capacity)
    }

    fn insert(&self, metric: Metric) {
        let mut metrics = self.metrics.write();
        Self::insert_locked(&mut metrics, metric);
    }

    fn insert_locked(metrics: &mut MetricTable, metric: Metric) {
        debug!(
            metric = %metric.name(),
            labels = %metric.label_signature(),
            metric_type = %metric.metric_type(),
            "Registered metric"
        );
        metrics
            .entry(metric.name().to_string())
            .or_default()
            .insert(metric.label_signature().to_string(), metric);
    }

    fn lookup<'a>(metrics: &'a MetricTable, name: &str, signature: &str) -> Option<&'a Metric> {
        metrics.get(name).and_then(|series| series.get(signature))
    }

    // The existing series stays alive for anyone holding its handle but is
    // no longer reachable through the registry.
    fn warn_type_mismatch(existing: &Metric, requested: MetricType) {
        warn!(
            metric = %existing.name(),
            labels = %existing.label_signature(),
            registered = %existing.metric_type(),
            requested = %requested,
            "Metric registered with a different type; creating an independent series"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments() {
        let counter = Counter::new("requests", "", Labels::new()).unwrap();
        counter.inc();
        counter.inc_by(2.5).unwrap();
        assert_eq!(counter.get(), 3.5);

        counter.reset();
        assert_eq!(counter.get(), 0.0);
    }

    #[test]
    fn test_counter_rejects_negative() {
        let counter = Counter::new("requests", "", Labels::new()).unwrap();
        counter.inc_by(4.0).unwrap();
        let err = counter.inc_by(-1.0).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(counter.get(), 4.0);
    }

    #[test]
    fn test_gauge_set_inc_dec() {
        let gauge = Gauge::new("queue_depth", "", Labels::new()).unwrap();
        gauge.set(5.0);
        gauge.inc_by(3.0);
        gauge.dec();
        assert_eq!(gauge.get(), 7.0);

        gauge.dec_by(10.0);
        assert_eq!(gauge.get(), -3.0);
    }

    #[test]
    fn test_metric_name_validation() {
        assert!(Counter::new("", "", Labels::new()).is_err());
        assert!(Gauge::new(&"g".repeat(201), "", Labels::new()).is_err());
        let counter = Counter::new("  padded  ", "", Labels::new()).unwrap();
        assert_eq!(counter.name(), "padded");
    }

    #[test]
    fn test_label_signature_is_sorted() {
        let a = labels([("region", "eu"), ("method", "GET")]);
        assert_eq!(label_signature(&a), "method=GET,region=eu");
        assert_eq!(label_signature(&Labels::new()), "");
    }

    #[test]
    fn test_histogram_basic_stats() {
        let histogram = Histogram::new("latency", "", Labels::new(), None).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            histogram.observe(v).unwrap();
        }

        let snapshot = histogram.get();
        assert_eq!(snapshot.count, 5);
        assert_eq!(snapshot.sum, 15.0);
        assert_eq!(snapshot.mean, 3.0);
        assert_eq!(snapshot.min, 1.0);
        assert_eq!(snapshot.max, 5.0);
        assert_eq!(snapshot.p50, 3.0);
        assert_eq!(snapshot.p99, 5.0);
    }

    #[test]
    fn test_histogram_empty_snapshot_is_zeroed() {
        let histogram = Histogram::new("latency", "", Labels::new(), None).unwrap();
        let snapshot = histogram.get();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.sum, 0.0);
        assert_eq!(snapshot.max, 0.0);
        assert_eq!(snapshot.buckets.len(), DEFAULT_BUCKETS.len());
        assert!(snapshot.buckets.iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_histogram_first_matching_bucket_only() {
        let histogram =
            Histogram::new("size", "", Labels::new(), Some(vec![1.0, 5.0, 10.0])).unwrap();
        for v in [0.5, 1.0, 3.0, 10.0, 50.0] {
            histogram.observe(v).unwrap();
        }

        let counts: Vec<u64> = histogram.get().buckets.iter().map(|b| b.count).collect();
        // 50.0 exceeds the highest boundary and lands nowhere
        assert_eq!(counts, vec![2, 1, 1]);
    }

    #[test]
    fn test_histogram_rejects_negative() {
        let histogram = Histogram::new("latency", "", Labels::new(), None).unwrap();
        assert!(histogram.observe(-0.1).is_err());
        assert_eq!(histogram.get().count, 0);
    }

    #[test]
    fn test_histogram_rejects_bad_buckets() {
        assert!(Histogram::new("latency", "", Labels::new(), Some(vec![])).is_err());
        assert!(Histogram::new("latency", "", Labels::new(), Some(vec![2.0, 1.0])).is_err());
    }

    #[test]
    fn test_histogram_window_eviction() {
        let histogram =
            Histogram::with_capacity("latency", "", Labels::new(), None, 3).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            histogram.observe(v).unwrap();
        }

        let snapshot = histogram.get();
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.sum, 10.0);
        assert_eq!(snapshot.retained, 3);
        assert_eq!(snapshot.min, 2.0);
        assert_eq!(snapshot.mean, 2.5);
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = MetricsRegistry::default();
        let first = registry
            .get_or_create_counter("x", "", labels([("a", "1")]))
            .unwrap();
        let second = registry
            .get_or_create_counter("x", "", labels([("a", "1")]))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.inc();
        assert_eq!(second.get(), 1.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_or_create_existing_histogram_skips_building() {
        let registry = MetricsRegistry::default();
        let first = registry
            .get_or_create_histogram("h", "", labels([("a", "1")]), None)
            .unwrap();

        // Empty buckets would fail validation if a new histogram were built
        let second = registry
            .get_or_create_histogram(" h ", "", labels([("a", "1")]), Some(vec![]))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(registry
            .get_or_create_histogram("h", "", labels([("a", "2")]), Some(vec![]))
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_replaces_existing() {
        let registry = MetricsRegistry::default();
        let old = registry.register_gauge("g", "", Labels::new()).unwrap();
        old.set(9.0);
        let new = registry.register_gauge("g", "", Labels::new()).unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        let found = registry.get_metric("g", &Labels::new()).unwrap();
        assert!(Arc::ptr_eq(found.as_gauge().unwrap(), &new));
        assert_eq!(new.get(), 0.0);
    }

    #[test]
    fn test_type_mismatch_creates_independent_series() {
        let registry = MetricsRegistry::default();
        let counter = registry.get_or_create_counter("dual", "", Labels::new()).unwrap();
        counter.inc();

        let gauge = registry.get_or_create_gauge("dual", "", Labels::new()).unwrap();
        gauge.set(42.0);

        assert_eq!(counter.get(), 1.0);
        let found = registry.get_metric("dual", &Labels::new()).unwrap();
        assert_eq!(found.metric_type(), MetricType::Gauge);
    }

    #[test]
    fn test_unknown_lookup_is_none() {
        let registry = MetricsRegistry::default();
        assert!(registry.get_metric("missing", &Labels::new()).is_none());
        assert!(registry.get_metric("", &Labels::new()).is_none());
    }

    #[test]
    fn test_summary_uses_default_key_for_unlabelled() {
        let registry = MetricsRegistry::default();
        registry.get_or_create_counter("hits", "", Labels::new()).unwrap().inc();
        registry
            .get_or_create_counter("hits", "", labels([("route", "/a")]))
            .unwrap()
            .inc_by(2.0)
            .unwrap();

        let summary = registry.summary();
        let hits = &summary["hits"];
        assert_eq!(hits[DEFAULT_LABEL_KEY], MetricValue::Value(1.0));
        assert_eq!(hits["route=/a"], MetricValue::Value(2.0));
    }

    #[test]
    fn test_registry_uses_configured_histogram_defaults() {
        let registry = MetricsRegistry::new(MetricsConfig {
            default_buckets: vec![1.0, 2.0],
            histogram_capacity: 2,
        });
        let histogram = registry
            .get_or_create_histogram("h", "", Labels::new(), None)
            .unwrap();
        assert_eq!(histogram.buckets(), &[1.0, 2.0]);

        for v in [1.0, 1.0, 2.0] {
            histogram.observe(v).unwrap();
        }
        assert_eq!(histogram.get().retained, 2);
    }

    #[test]
    fn test_samples_are_ordered_with_labels() {
        let registry = MetricsRegistry::default();
        registry.register_gauge("b", "second", Labels::new()).unwrap().set(2.0);
        registry
            .register_counter("a", "first", labels([("zone", "z1")]))
            .unwrap()
            .inc();

        let samples = registry.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "a");
        assert_eq!(samples[0].labels["zone"], "z1");
        assert_eq!(samples[0].metric_type, MetricType::Counter);
        assert_eq!(samples[1].description, "second");
        assert_eq!(samples[1].value, MetricValue::Value(2.0));
    }

    #[test]
    fn test_clear() {
        let registry = MetricsRegistry::default();
        registry.register_counter("a", "", Labels::new()).unwrap();
        registry.register_gauge("b", "", Labels::new()).unwrap();
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get_all_metrics().is_empty());
    }
}
