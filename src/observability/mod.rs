// Configuration for every subsystem
pub mod config;

// Counters, gauges, histograms and their registry
pub mod metrics;

// Span-based tracing
pub mod tracing;

// Latency and throughput tracking
pub mod performance;

// Health probes and aggregation
pub mod health;

// Subscriber setup
pub mod logging;

// Facade and process-wide instance
pub mod facade;

// Snapshot exporters
pub mod exporter;

// Percentile helpers shared by metrics and performance
pub(crate) mod stats;

// Re-export commonly used types for convenience
pub use config::{LogConfig, LogFormat, LogOutput, ObservabilityConfig};
pub use exporter::{ExportBatch, MetricsFacadeExporter, PrometheusTextExporter, StatusExporter};
pub use facade::{get_observability, reset_observability, set_observability, FullStatus, Observability, SubsystemSummary};
pub use health::{HealthCheck, HealthCheckResult, HealthChecker, HealthConfig, HealthReport, HealthStatus};
pub use logging::init_logging;
pub use metrics::{labels, Counter, Gauge, Histogram, Labels, Metric, MetricType, MetricsConfig, MetricsRegistry};
pub use performance::{PerformanceConfig, PerformanceMonitor};
pub use stats::LatencyStats;
pub use self::tracing::{SpanGuard, Tracer, TraceSpan};
