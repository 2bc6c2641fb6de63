//! # SDK Observability
//!
//! In-process metrics, tracing, performance monitoring and health checking
//! for SDK clients, unified behind a single facade.
//!
//! ## Layout
//! - [`core`]: error type and input validation shared by every subsystem
//! - [`observability`]: the four subsystems, their configuration, the
//!   [`Observability`] facade and the snapshot exporters
//!
//! Every subsystem is safe to share across threads behind an `Arc`. Nothing
//! here talks to the network; snapshots leave the process only through a
//! [`StatusExporter`] the host chooses.
//!
//! ```no_run
//! use sdk_observability::{get_observability, Labels};
//!
//! let observability = get_observability();
//! if let Some(metrics) = observability.metrics() {
//!     let requests = metrics
//!         .get_or_create_counter("requests_total", "Requests sent", Labels::new())
//!         .unwrap();
//!     requests.inc();
//! }
//! let status = observability.get_full_status();
//! println!("{}", serde_json::to_string_pretty(&status).unwrap());
//! ```

/// Error types and validation helpers
pub mod core;

/// Metrics, tracing, performance monitoring, health checks and the facade
pub mod observability;

pub use crate::core::error::{ObservabilityError, ObservabilityResult};
pub use crate::observability::{
    get_observability, init_logging, labels, reset_observability, set_observability, Counter,
    ExportBatch, FullStatus, Gauge, HealthCheck, HealthChecker, HealthStatus, Histogram, Labels,
    LatencyStats, Metric, MetricType, MetricsRegistry, Observability, ObservabilityConfig,
    PerformanceMonitor, SpanGuard, StatusExporter, SubsystemSummary, TraceSpan, Tracer,
};
