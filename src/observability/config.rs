use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{ObservabilityError, ObservabilityResult};
use crate::core::validation::validate_buckets;
use crate::observability::health::HealthConfig;
use crate::observability::metrics::MetricsConfig;
use crate::observability::performance::PerformanceConfig;

/// Top-level configuration of the observability facade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub enable_metrics: bool,
    pub enable_tracing: bool,
    pub enable_performance_monitoring: bool,
    pub enable_health_checks: bool,
    pub logging: LogConfig,
    pub metrics: MetricsConfig,
    pub performance: PerformanceConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
}

/// Service name used when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "sdk";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            enable_metrics: true,
            enable_tracing: true,
            enable_performance_monitoring: true,
            enable_health_checks: true,
            logging: LogConfig::default(),
            metrics: MetricsConfig::default(),
            performance: PerformanceConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stdout,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "standard" => Ok(LogFormat::Text),
            other => Err(crate::config_error!("Unknown log format: {}", other)),
        }
    }
}

impl ObservabilityConfig {
    /// Config with a custom service name and everything else default
    pub fn for_service<S: Into<String>>(service_name: S) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ObservabilityResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ObservabilityError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: ObservabilityConfig = serde_yaml::from_str(&content)
            .map_err(|e| ObservabilityError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> ObservabilityResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ObservabilityError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: ObservabilityConfig = serde_json::from_str(&content)
            .map_err(|e| ObservabilityError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Variables follow the pattern `OBSERVABILITY_<FIELD>`, for example
    /// `OBSERVABILITY_METRICS_ENABLED=false`.
    pub fn apply_env_overrides(&mut self) -> ObservabilityResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with a
    /// custom variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ObservabilityResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("OBSERVABILITY_SERVICE_NAME") {
            self.service_name = name;
        }

        let flags = [
            ("OBSERVABILITY_METRICS_ENABLED", &mut self.enable_metrics),
            ("OBSERVABILITY_TRACING_ENABLED", &mut self.enable_tracing),
            ("OBSERVABILITY_PERFORMANCE_ENABLED", &mut self.enable_performance_monitoring),
            ("OBSERVABILITY_HEALTH_ENABLED", &mut self.enable_health_checks),
        ];
        for (key, flag) in flags {
            if let Some(value) = lookup(key) {
                *flag = value
                    .trim()
                    .parse()
                    .map_err(|e| ObservabilityError::config(format!("Invalid {}: {}", key, e)))?;
            }
        }

        if let Some(level) = lookup("OBSERVABILITY_LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }

        if let Some(format) = lookup("OBSERVABILITY_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        if let Some(timeout) = lookup("OBSERVABILITY_HEALTH_TIMEOUT") {
            self.health.default_timeout = humantime::parse_duration(timeout.trim()).map_err(|e| {
                ObservabilityError::config(format!("Invalid OBSERVABILITY_HEALTH_TIMEOUT: {}", e))
            })?;
        }

        Ok(())
    }

    /// Check every field and report all problems at once
    pub fn validate(&self) -> ObservabilityResult<()> {
        let mut errors = Vec::new();

        if self.service_name.trim().is_empty() {
            errors.push("service_name cannot be empty".to_string());
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!("Unknown log level: {}", self.logging.level));
        }

        if let LogOutput::File(path) = &self.logging.output {
            if path.trim().is_empty() {
                errors.push("log file path cannot be empty".to_string());
            }
        }

        if let Err(e) = validate_buckets(&self.metrics.default_buckets) {
            errors.push(e.to_string());
        }

        if self.metrics.histogram_capacity == 0 {
            errors.push("histogram_capacity must be greater than 0".to_string());
        }

        if self.performance.latency_history == 0 {
            errors.push("latency_history must be greater than 0".to_string());
        }

        if self.performance.throughput_history == 0 {
            errors.push("throughput_history must be greater than 0".to_string());
        }

        if self.performance.throughput_window_seconds == 0 {
            errors.push("throughput_window_seconds must be greater than 0".to_string());
        }

        if self.health.default_timeout.is_zero() {
            errors.push("health default_timeout must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ObservabilityError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_validation() {
        let config = ObservabilityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_name, "sdk");
        assert!(config.enable_metrics && config.enable_tracing);
        assert_eq!(config.performance.latency_history, 1000);
        assert_eq!(config.metrics.histogram_capacity, 10_000);
    }

    #[test]
    fn test_config_serialization_yaml() {
        let config = ObservabilityConfig::for_service("billing");
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: ObservabilityConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ObservabilityConfig = serde_yaml::from_str(
            r#"
service_name: orders
enable_tracing: false
health:
  default_timeout: 250ms
"#,
        )
        .unwrap();

        assert_eq!(config.service_name, "orders");
        assert!(!config.enable_tracing);
        assert!(config.enable_metrics);
        assert_eq!(config.health.default_timeout, Duration::from_millis(250));
        assert_eq!(config.performance, PerformanceConfig::default());
    }

    #[test]
    fn test_overrides() {
        let mut config = ObservabilityConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("OBSERVABILITY_SERVICE_NAME", "inventory"),
                ("OBSERVABILITY_METRICS_ENABLED", "false"),
                ("OBSERVABILITY_LOG_LEVEL", "DEBUG"),
                ("OBSERVABILITY_LOG_FORMAT", "json"),
                ("OBSERVABILITY_HEALTH_TIMEOUT", "2s"),
            ]))
            .unwrap();

        assert_eq!(config.service_name, "inventory");
        assert!(!config.enable_metrics);
        assert!(config.enable_tracing);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.health.default_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_override() {
        let mut config = ObservabilityConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("OBSERVABILITY_TRACING_ENABLED", "maybe")]))
            .unwrap_err();
        assert_eq!(err.error_type(), "configuration_error");

        let mut config = ObservabilityConfig::default();
        assert!(config
            .apply_overrides(lookup_from(&[("OBSERVABILITY_HEALTH_TIMEOUT", "soon")]))
            .is_err());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = ObservabilityConfig::default();
        config.service_name = " ".to_string();
        config.logging.level = "loud".to_string();
        config.metrics.default_buckets = vec![1.0, 0.5];
        config.performance.throughput_window_seconds = 0;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("service_name cannot be empty"));
        assert!(message.contains("Unknown log level: loud"));
        assert!(message.contains("strictly ascending"));
        assert!(message.contains("throughput_window_seconds"));
    }

    #[tokio::test]
    async fn test_load_config_from_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("observability.yaml");

        let config_content = r#"
service_name: "ledger"
enable_performance_monitoring: false
logging:
  level: "warn"
  format: "json"
  output: "stderr"
metrics:
  default_buckets: [0.1, 1.0, 10.0]
  histogram_capacity: 500
"#;
        tokio::fs::write(&config_path, config_content).await.unwrap();

        let config = ObservabilityConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.output, LogOutput::Stderr);
        assert_eq!(config.metrics.default_buckets, vec![0.1, 1.0, 10.0]);
        assert_eq!(config.metrics.histogram_capacity, 500);
        assert!(!config.enable_performance_monitoring);
    }

    #[tokio::test]
    async fn test_load_config_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("observability.json");
        tokio::fs::write(
            &config_path,
            r#"{"service_name": "jobs", "logging": {"output": {"file": "/tmp/jobs.log"}}}"#,
        )
        .await
        .unwrap();

        let config = ObservabilityConfig::load_from_json(&config_path).await.unwrap();
        assert_eq!(config.logging.output, LogOutput::File("/tmp/jobs.log".to_string()));
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let err = ObservabilityConfig::load_from_file("/definitely/not/here.yaml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[tokio::test]
    async fn test_invalid_file_rejected_by_validation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.yaml");
        tokio::fs::write(&config_path, "performance:\n  latency_history: 0\n")
            .await
            .unwrap();

        let err = ObservabilityConfig::load_from_file(&config_path).await.unwrap_err();
        assert!(err.to_string().contains("latency_history"));
    }
}
