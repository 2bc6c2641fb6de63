//! # Health Checking
//!
//! Named boolean probes and the registry that aggregates them.
//!
//! A probe is any `Fn() -> anyhow::Result<bool>`. `Ok(true)` is healthy,
//! `Ok(false)` is unhealthy, and an `Err` or a panic is unhealthy with the
//! error message kept as `last_error`. Probe failures never escape
//! [`HealthCheck::run`] or [`HealthChecker::run_all`].
//!
//! ## Timeouts
//! `run`/`run_all` call the probe on the current thread and treat the
//! timeout as metadata only: a slow probe blocks the caller. The
//! `*_with_deadline` variants run probes on the tokio blocking pool and give
//! up after the timeout; the abandoned probe keeps running in the background
//! but its outcome is discarded.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::ObservabilityResult;
use crate::core::validation::{validate_name, validate_non_empty};
use crate::validation_error;

/// Longest accepted health-check name
pub const MAX_CHECK_NAME_LENGTH: usize = 100;

/// Probe signature
pub type HealthProbe = dyn Fn() -> anyhow::Result<bool> + Send + Sync;

/// Configuration for health checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Timeout given to checks registered without one
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of one probe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds spent in the probe
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
}

/// Memo of the last run, without re-running the probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckStatus {
    pub name: String,
    pub last_check: Option<DateTime<Utc>>,
    pub last_result: Option<bool>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct LastRun {
    checked_at: Option<DateTime<Utc>>,
    result: Option<bool>,
    error: Option<String>,
}

/// A named, timeout-bounded boolean probe
pub struct HealthCheck {
    name: String,
    probe: Arc<HealthProbe>,
    timeout: Duration,
    last: Mutex<LastRun>,
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheck")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("last", &self.last)
            .finish()
    }
}

impl HealthCheck {
    pub fn new<F>(name: &str, probe: F, timeout: Duration) -> ObservabilityResult<Self>
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let name = validate_name(name, "name", 1, Some(MAX_CHECK_NAME_LENGTH))?;
        if timeout.is_zero() {
            return Err(validation_error!("timeout", "timeout must be positive"));
        }

        Ok(Self {
            name,
            probe: Arc::new(probe),
            timeout,
            last: Mutex::new(LastRun::default()),
        })
    }

    /// Check with the default five second timeout
    pub fn with_default_timeout<F>(name: &str, probe: F) -> ObservabilityResult<Self>
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::new(name, probe, HealthConfig::default().default_timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the probe on the calling thread
    pub fn run(&self) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = invoke(self.probe.as_ref());
        self.record(outcome, started.elapsed())
    }

    /// Run the probe on the blocking pool and stop waiting after `timeout`.
    /// Must be called from within a tokio runtime.
    pub async fn run_with_deadline(&self) -> HealthCheckResult {
        let started = Instant::now();
        let probe = self.probe.clone();
        let task = tokio::task::spawn_blocking(move || invoke(probe.as_ref()));

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(format!("Health check task failed: {}", e)),
            Err(_) => Err(format!("Health check timed out after {:?}", self.timeout)),
        };
        self.record(outcome, started.elapsed())
    }

    /// Last memoized outcome
    pub fn get_status(&self) -> HealthCheckStatus {
        let last = self.last.lock();
        HealthCheckStatus {
            name: self.name.clone(),
            last_check: last.checked_at,
            last_result: last.result,
            last_error: last.error.clone(),
        }
    }

    fn record(&self, outcome: Result<bool, String>, duration: Duration) -> HealthCheckResult {
        let timestamp = Utc::now();
        let (healthy, error) = match outcome {
            Ok(healthy) => (healthy, None),
            Err(error) => (false, Some(error)),
        };

        {
            let mut last = self.last.lock();
            last.checked_at = Some(timestamp);
            last.result = Some(healthy);
            last.error = error.clone();
        }

        if let Some(error) = &error {
            warn!(check = %self.name, error = %error, "Health check failed");
        } else if !healthy {
            warn!(check = %self.name, "Health check reported unhealthy");
        }

        HealthCheckResult {
            name: self.name.clone(),
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            error,
            duration: duration.as_secs_f64(),
            timestamp,
        }
    }
}

/// Call the probe, turning errors and panics into a message
fn invoke(probe: &HealthProbe) -> Result<bool, String> {
    match catch_unwind(AssertUnwindSafe(probe)) {
        Ok(Ok(healthy)) => Ok(healthy),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("Health check panicked: {}", message))
        }
    }
}

/// Aggregated result of running every check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Healthy iff every check is healthy
    pub status: HealthStatus,
    pub checks: BTreeMap<String, HealthCheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    fn new(checks: BTreeMap<String, HealthCheckResult>) -> Self {
        let status = if checks.values().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            status,
            checks,
            timestamp: Utc::now(),
        }
    }
}

/// Last-run memos of every check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatusReport {
    pub checks: BTreeMap<String, HealthCheckStatus>,
    pub timestamp: DateTime<Utc>,
}

/// Registry and aggregator of health checks
#[derive(Debug, Default)]
pub struct HealthChecker {
    checks: DashMap<String, Arc<HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check, replacing any check with the same name
    pub fn register(&self, check: HealthCheck) -> Arc<HealthCheck> {
        let check = Arc::new(check);
        debug!(check = %check.name, timeout = ?check.timeout, "Registered health check");
        self.checks.insert(check.name.clone(), check.clone());
        check
    }

    /// Remove a check; returns whether it existed
    pub fn unregister(&self, name: &str) -> ObservabilityResult<bool> {
        let name = validate_non_empty(name, "name")?;
        Ok(self.checks.remove(&name).is_some())
    }

    pub fn get(&self, name: &str) -> Option<Arc<HealthCheck>> {
        self.checks.get(name.trim()).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check synchronously
    pub fn run_all(&self) -> HealthReport {
        let checks = self
            .snapshot()
            .into_iter()
            .map(|check| (check.name.clone(), check.run()))
            .collect();
        HealthReport::new(checks)
    }

    /// Run every check concurrently, each bounded by its own timeout
    pub async fn run_all_with_deadline(&self) -> HealthReport {
        let checks = self.snapshot();
        let results = join_all(checks.iter().map(|check| check.run_with_deadline())).await;
        HealthReport::new(
            results
                .into_iter()
                .map(|result| (result.name.clone(), result))
                .collect(),
        )
    }

    /// Last-run memos, without running anything
    pub fn get_status(&self) -> HealthStatusReport {
        HealthStatusReport {
            checks: self
                .snapshot()
                .into_iter()
                .map(|check| (check.name.clone(), check.get_status()))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    // Probes run outside the map's shard locks
    fn snapshot(&self) -> Vec<Arc<HealthCheck>> {
        self.checks.iter().map(|entry| entry.value().clone()).collect()
    }
}
