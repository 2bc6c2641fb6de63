//! # Observability Facade
//!
//! [`Observability`] bundles the four subsystems behind their enable flags
//! and produces a single [`FullStatus`] snapshot. It only reads from the
//! subsystems; application code keeps calling them directly through the
//! shared `Arc` handles.
//!
//! A disabled subsystem reports [`SubsystemSummary::NotEnabled`], which
//! serializes as `{"error": "<Subsystem> not enabled"}` and is never
//! confused with an enabled subsystem that simply has no data yet.
//!
//! ## Process-wide instance
//! [`get_observability`] lazily builds a default instance on first use.
//! [`set_observability`] swaps in a custom one atomically and
//! [`reset_observability`] drops it so the next read builds a fresh default.
//! Handles obtained before a swap keep pointing at the old instance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::error::ObservabilityResult;
use crate::observability::config::ObservabilityConfig;
use crate::observability::exporter::{ExportBatch, StatusExporter};
use crate::observability::health::{HealthCheck, HealthChecker, HealthStatusReport};
use crate::observability::metrics::{MetricsRegistry, MetricsSummary};
use crate::observability::performance::{PerformanceMonitor, PerformanceSummary};
use crate::observability::tracing::{Tracer, TracingSummary};

/// Summary of one subsystem, or a marker that it is switched off
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubsystemSummary<T> {
    Enabled(T),
    NotEnabled { error: String },
}

impl<T> SubsystemSummary<T> {
    fn not_enabled(subsystem: &str) -> Self {
        SubsystemSummary::NotEnabled {
            error: format!("{} not enabled", subsystem),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SubsystemSummary::Enabled(_))
    }

    pub fn enabled(&self) -> Option<&T> {
        match self {
            SubsystemSummary::Enabled(summary) => Some(summary),
            SubsystemSummary::NotEnabled { .. } => None,
        }
    }

    pub fn into_enabled(self) -> Option<T> {
        match self {
            SubsystemSummary::Enabled(summary) => Some(summary),
            SubsystemSummary::NotEnabled { .. } => None,
        }
    }
}

/// Snapshot of every subsystem at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullStatus {
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: SubsystemSummary<MetricsSummary>,
    pub tracing: SubsystemSummary<TracingSummary>,
    pub performance: SubsystemSummary<PerformanceSummary>,
    pub health: SubsystemSummary<HealthStatusReport>,
}

/// Facade over metrics, tracing, performance monitoring and health checks
#[derive(Debug)]
pub struct Observability {
    config: ObservabilityConfig,
    metrics: Option<Arc<MetricsRegistry>>,
    tracer: Option<Arc<Tracer>>,
    performance_monitor: Option<Arc<PerformanceMonitor>>,
    health_checker: Option<Arc<HealthChecker>>,
}

impl Default for Observability {
    fn default() -> Self {
        let config = ObservabilityConfig::default();
        Self {
            metrics: Some(Arc::new(MetricsRegistry::new(config.metrics.clone()))),
            tracer: Some(Arc::new(Tracer::default())),
            performance_monitor: Some(Arc::new(PerformanceMonitor::new(config.performance.clone()))),
            health_checker: Some(Arc::new(HealthChecker::new())),
            config,
        }
    }
}

impl Observability {
    /// Build every enabled subsystem from `config`
    pub fn new(config: ObservabilityConfig) -> ObservabilityResult<Self> {
        config.validate()?;

        let metrics = config
            .enable_metrics
            .then(|| Arc::new(MetricsRegistry::new(config.metrics.clone())));
        let tracer = if config.enable_tracing {
            Some(Arc::new(Tracer::new(&config.service_name)?))
        } else {
            None
        };
        let performance_monitor = config
            .enable_performance_monitoring
            .then(|| Arc::new(PerformanceMonitor::new(config.performance.clone())));
        let health_checker = config
            .enable_health_checks
            .then(|| Arc::new(HealthChecker::new()));

        info!(
            service = %config.service_name,
            metrics = config.enable_metrics,
            tracing = config.enable_tracing,
            performance = config.enable_performance_monitoring,
            health = config.enable_health_checks,
            "Observability initialized"
        );

        Ok(Self {
            config,
            metrics,
            tracer,
            performance_monitor,
            health_checker,
        })
    }

    /// Defaults with a custom service name
    pub fn for_service(service_name: &str) -> ObservabilityResult<Self> {
        Self::new(ObservabilityConfig::for_service(service_name))
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    pub fn tracer(&self) -> Option<&Arc<Tracer>> {
        self.tracer.as_ref()
    }

    pub fn performance_monitor(&self) -> Option<&Arc<PerformanceMonitor>> {
        self.performance_monitor.as_ref()
    }

    pub fn health_checker(&self) -> Option<&Arc<HealthChecker>> {
        self.health_checker.as_ref()
    }

    /// Register a probe with the configured default timeout.
    ///
    /// Returns `Ok(None)` when health checks are disabled.
    pub fn register_health_check<F>(
        &self,
        name: &str,
        probe: F,
    ) -> ObservabilityResult<Option<Arc<HealthCheck>>>
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let Some(checker) = &self.health_checker else {
            debug!(check = %name, "Health checks disabled, probe not registered");
            return Ok(None);
        };
        let check = HealthCheck::new(name, probe, self.config.health.default_timeout)?;
        Ok(Some(checker.register(check)))
    }

    pub fn get_metrics_summary(&self) -> SubsystemSummary<MetricsSummary> {
        match &self.metrics {
            Some(registry) => SubsystemSummary::Enabled(registry.summary()),
            None => SubsystemSummary::not_enabled("Metrics"),
        }
    }

    pub fn get_traces_summary(&self) -> SubsystemSummary<TracingSummary> {
        match &self.tracer {
            Some(tracer) => SubsystemSummary::Enabled(tracer.summary()),
            None => SubsystemSummary::not_enabled("Tracing"),
        }
    }

    pub fn get_performance_summary(&self) -> SubsystemSummary<PerformanceSummary> {
        match &self.performance_monitor {
            Some(monitor) => SubsystemSummary::Enabled(monitor.summary()),
            None => SubsystemSummary::not_enabled("Performance monitoring"),
        }
    }

    /// Last-run memos; probes are not re-run
    pub fn get_health_status(&self) -> SubsystemSummary<HealthStatusReport> {
        match &self.health_checker {
            Some(checker) => SubsystemSummary::Enabled(checker.get_status()),
            None => SubsystemSummary::not_enabled("Health checks"),
        }
    }

    pub fn get_full_status(&self) -> FullStatus {
        FullStatus {
            service_name: self.config.service_name.clone(),
            timestamp: Utc::now(),
            metrics: self.get_metrics_summary(),
            tracing: self.get_traces_summary(),
            performance: self.get_performance_summary(),
            health: self.get_health_status(),
        }
    }

    /// Full status plus per-series labels and span records
    pub fn export_batch(&self) -> ExportBatch {
        ExportBatch {
            status: self.get_full_status(),
            series: self
                .metrics
                .as_ref()
                .map(|registry| registry.samples())
                .unwrap_or_default(),
            spans: self
                .tracer
                .as_ref()
                .map(|tracer| tracer.get_all_spans().iter().map(|span| span.to_record()).collect())
                .unwrap_or_default(),
        }
    }

    /// Hand the current snapshot to `exporter`
    pub async fn export(&self, exporter: &dyn StatusExporter) -> ObservabilityResult<()> {
        let batch = self.export_batch();
        debug!(
            exporter = exporter.name(),
            series = batch.series.len(),
            spans = batch.spans.len(),
            "Exporting observability snapshot"
        );
        exporter.export(&batch).await
    }
}

static GLOBAL_OBSERVABILITY: Lazy<RwLock<Option<Arc<Observability>>>> =
    Lazy::new(|| RwLock::new(None));

/// The process-wide instance, built with defaults on first use
pub fn get_observability() -> Arc<Observability> {
    if let Some(current) = GLOBAL_OBSERVABILITY.read().as_ref() {
        return current.clone();
    }

    GLOBAL_OBSERVABILITY
        .write()
        .get_or_insert_with(|| Arc::new(Observability::default()))
        .clone()
}

/// Replace the process-wide instance, returning the previous one
pub fn set_observability(observability: impl Into<Arc<Observability>>) -> Option<Arc<Observability>> {
    GLOBAL_OBSERVABILITY.write().replace(observability.into())
}

/// Drop the process-wide instance; the next read builds a fresh default
pub fn reset_observability() -> Option<Arc<Observability>> {
    GLOBAL_OBSERVABILITY.write().take()
}
