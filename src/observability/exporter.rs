//! # Status Exporters
//!
//! Extension point for shipping snapshots elsewhere. Nothing here opens a
//! network connection: [`PrometheusTextExporter`] renders text exposition
//! into memory for the host to serve, [`MetricsFacadeExporter`] mirrors
//! values into the `metrics` crate so the host's installed recorder picks
//! them up.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::core::error::ObservabilityResult;
use crate::observability::facade::FullStatus;
use crate::observability::metrics::{Labels, MetricType, MetricValue, SeriesSample};
use crate::observability::tracing::SpanRecord;

/// Everything an exporter gets handed in one export call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBatch {
    pub status: FullStatus,
    /// Every metric series with its full label set
    pub series: Vec<SeriesSample>,
    /// Every span the tracer still owns, oldest first
    pub spans: Vec<SpanRecord>,
}

/// Destination for observability snapshots
#[async_trait]
pub trait StatusExporter: Send + Sync {
    fn name(&self) -> &str;

    async fn export(&self, batch: &ExportBatch) -> ObservabilityResult<()>;
}

/// Renders metric series in the Prometheus text exposition format.
///
/// Histograms are exposed as `summary` families (p50/p95/p99 quantiles plus
/// `_sum` and `_count`) since their buckets only cover the retained window.
#[derive(Debug, Default)]
pub struct PrometheusTextExporter {
    last_output: Mutex<String>,
}

impl PrometheusTextExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text produced by the latest export
    pub fn last_output(&self) -> String {
        self.last_output.lock().clone()
    }

    /// Render `series` as text exposition.
    ///
    /// Series are grouped into families by sanitized name. A family takes
    /// the type of its first series; later series of another type are
    /// skipped with a warning.
    pub fn to_prometheus_format(series: &[SeriesSample]) -> String {
        let mut families: BTreeMap<String, Family<'_>> = BTreeMap::new();
        for sample in series {
            let name = sanitize_metric_name(&sample.name);
            let family = families.entry(name.clone()).or_insert_with(|| Family {
                metric_type: sample.metric_type,
                help: None,
                samples: Vec::new(),
            });

            if family.metric_type != sample.metric_type {
                warn!(
                    metric = %sample.name,
                    family = %name,
                    family_type = %family.metric_type,
                    series_type = %sample.metric_type,
                    "Skipping series whose type conflicts with its Prometheus family"
                );
                continue;
            }
            if family.help.is_none() && !sample.description.is_empty() {
                family.help = Some(sample.description.as_str());
            }
            family.samples.push(sample);
        }

        let mut out = String::new();
        for (name, family) in &families {
            if let Some(help) = family.help {
                let _ = writeln!(out, "# HELP {} {}", name, escape_help(help));
            }
            let family_type = match family.metric_type {
                MetricType::Histogram => "summary".to_string(),
                other => other.to_string(),
            };
            let _ = writeln!(out, "# TYPE {} {}", name, family_type);

            for sample in &family.samples {
                Self::write_sample(&mut out, name, sample);
            }
        }

        out
    }

    fn write_sample(out: &mut String, name: &str, sample: &SeriesSample) {
        match &sample.value {
            MetricValue::Value(value) => {
                let _ = writeln!(out, "{}{} {}", name, render_labels(&sample.labels, None), value);
            }
            MetricValue::Histogram(snapshot) => {
                for (quantile, value) in [
                    ("0.5", snapshot.p50),
                    ("0.95", snapshot.p95),
                    ("0.99", snapshot.p99),
                ] {
                    let _ = writeln!(
                        out,
                        "{}{} {}",
                        name,
                        render_labels(&sample.labels, Some(("quantile", quantile))),
                        value
                    );
                }
                let labels = render_labels(&sample.labels, None);
                let _ = writeln!(out, "{}_sum{} {}", name, labels, snapshot.sum);
                let _ = writeln!(out, "{}_count{} {}", name, labels, snapshot.count);
            }
        }
    }
}

struct Family<'a> {
    metric_type: MetricType,
    help: Option<&'a str>,
    samples: Vec<&'a SeriesSample>,
}

#[async_trait]
impl StatusExporter for PrometheusTextExporter {
    fn name(&self) -> &str {
        "prometheus_text"
    }

    async fn export(&self, batch: &ExportBatch) -> ObservabilityResult<()> {
        let rendered = Self::to_prometheus_format(&batch.series);
        *self.last_output.lock() = rendered;
        Ok(())
    }
}

fn sanitize_metric_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

fn sanitize_label_name(name: &str) -> String {
    sanitize_metric_name(name).replace(':', "_")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn render_labels(labels: &Labels, extra: Option<(&str, &str)>) -> String {
    let mut pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", sanitize_label_name(k), escape_label_value(v)))
        .collect();
    if let Some((k, v)) = extra {
        pairs.push(format!("{}=\"{}\"", k, v));
    }

    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

/// Mirrors every series into the `metrics` crate facade.
///
/// Counters are set with `absolute` (fractional parts are dropped), gauges
/// with `set`. A histogram becomes the gauges `<name>_count`, `<name>_sum`
/// and `<name>` with a `quantile` label. Without an installed recorder every
/// call is a no-op.
#[derive(Debug, Default)]
pub struct MetricsFacadeExporter;

impl MetricsFacadeExporter {
    pub fn new() -> Self {
        Self
    }

    fn facade_labels(labels: &Labels) -> Vec<metrics::Label> {
        labels
            .iter()
            .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
            .collect()
    }

    fn publish(sample: &SeriesSample) {
        let labels = Self::facade_labels(&sample.labels);
        match (&sample.metric_type, &sample.value) {
            (MetricType::Counter, MetricValue::Value(value)) => {
                metrics::counter!(sample.name.clone(), labels).absolute(value.max(0.0) as u64);
            }
            (_, MetricValue::Value(value)) => {
                metrics::gauge!(sample.name.clone(), labels).set(*value);
            }
            (_, MetricValue::Histogram(snapshot)) => {
                metrics::gauge!(format!("{}_count", sample.name), labels.clone())
                    .set(snapshot.count as f64);
                metrics::gauge!(format!("{}_sum", sample.name), labels.clone()).set(snapshot.sum);
                for (quantile, value) in [("0.5", snapshot.p50), ("0.95", snapshot.p95), ("0.99", snapshot.p99)] {
                    let mut quantile_labels = labels.clone();
                    quantile_labels.push(metrics::Label::new("quantile", quantile));
                    metrics::gauge!(sample.name.clone(), quantile_labels).set(value);
                }
            }
        }
    }
}

#[async_trait]
impl StatusExporter for MetricsFacadeExporter {
    fn name(&self) -> &str {
        "metrics_facade"
    }

    async fn export(&self, batch: &ExportBatch) -> ObservabilityResult<()> {
        batch.series.iter().for_each(Self::publish);
        Ok(())
    }
}
