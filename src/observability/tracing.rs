//! # Distributed Tracing
//!
//! Spans and the tracer that owns them. A trace is the set of spans sharing
//! a `trace_id`; the first span started without a trace id becomes its root.
//!
//! ## Active span
//! The tracer remembers one active span per OS thread. [`Tracer::span`] uses
//! it to pick the parent of a new span, so nested scopes on one thread build
//! a tree without passing ids around. Code that hops threads (async tasks on
//! a multi-threaded runtime) should pass `parent_span_id`/`trace_id` to
//! [`Tracer::start_span`] explicitly instead.
//!
//! ## Locking
//! One tracer-wide mutex guards the span map and the active-span map. Tags,
//! logs and `finish` go through the span's own mutex.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::ObservabilityResult;
use crate::core::validation::validate_non_empty;
use crate::observability::config::DEFAULT_SERVICE_NAME;

/// Span tags
pub type Tags = HashMap<String, Value>;

/// Severity of a span log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// One entry of a span's append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Default)]
struct SpanState {
    tags: Tags,
    logs: Vec<SpanLog>,
    end_time: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

/// A single timed operation within a trace
#[derive(Debug)]
pub struct TraceSpan {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    operation_name: String,
    start_time: DateTime<Utc>,
    started: Instant,
    state: Mutex<SpanState>,
}

impl TraceSpan {
    fn new(trace_id: String, parent_span_id: Option<String>, operation_name: String, tags: Tags) -> Self {
        Self {
            trace_id,
            span_id: Uuid::new_v4().to_string(),
            parent_span_id,
            operation_name,
            start_time: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(SpanState {
                tags,
                ..SpanState::default()
            }),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().end_time
    }

    /// `None` until the span is finished
    pub fn duration(&self) -> Option<Duration> {
        self.state.lock().duration
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().duration.is_some()
    }

    /// Set or overwrite a tag
    pub fn add_tag<V: Into<Value>>(&self, key: &str, value: V) -> ObservabilityResult<()> {
        let key = validate_non_empty(key, "key")?;
        self.state.lock().tags.insert(key, value.into());
        Ok(())
    }

    pub fn tags(&self) -> Tags {
        self.state.lock().tags.clone()
    }

    /// Append a log entry
    pub fn add_log(&self, message: &str, level: LogLevel, fields: HashMap<String, Value>) {
        self.state.lock().logs.push(SpanLog {
            timestamp: Utc::now(),
            message: message.trim().to_string(),
            level,
            fields,
        });
    }

    pub fn logs(&self) -> Vec<SpanLog> {
        self.state.lock().logs.clone()
    }

    /// Record the end time and duration. Only the first call has an effect;
    /// returns whether this call finished the span.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock();
        if state.duration.is_some() {
            return false;
        }
        state.end_time = Some(Utc::now());
        state.duration = Some(self.started.elapsed());
        true
    }

    /// Serializable copy of the span
    pub fn to_record(&self) -> SpanRecord {
        let state = self.state.lock();
        SpanRecord {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
            operation_name: self.operation_name.clone(),
            tags: state.tags.clone(),
            logs: state.logs.clone(),
            start_time: self.start_time,
            end_time: state.end_time,
            duration: state.duration.map(|d| d.as_secs_f64()),
        }
    }
}

/// Plain-data view of a span, for exporters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub tags: Tags,
    pub logs: Vec<SpanLog>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: Option<f64>,
}

/// Span and trace counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingSummary {
    pub total_spans: usize,
    pub total_traces: usize,
    pub finished_spans: usize,
    pub active_spans: usize,
}

#[derive(Debug, Default)]
struct TracerState {
    spans: HashMap<String, Arc<TraceSpan>>,
    active: HashMap<ThreadId, String>,
}

/// Creates spans, owns them, and tracks the active span per thread
#[derive(Debug)]
pub struct Tracer {
    service_name: String,
    state: Mutex<TracerState>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            state: Mutex::new(TracerState::default()),
        }
    }
}

impl Tracer {
    pub fn new(service_name: &str) -> ObservabilityResult<Self> {
        Ok(Self {
            service_name: validate_non_empty(service_name, "service_name")?,
            state: Mutex::new(TracerState::default()),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Start a span and make it the active span of the calling thread.
    ///
    /// Without `trace_id` a fresh trace is started and the span is its root.
    pub fn start_span(
        &self,
        operation_name: &str,
        parent_span_id: Option<&str>,
        tags: Tags,
        trace_id: Option<&str>,
    ) -> ObservabilityResult<Arc<TraceSpan>> {
        let operation_name = validate_non_empty(operation_name, "operation_name")?;
        let trace_id = match trace_id {
            Some(id) => validate_non_empty(id, "trace_id")?,
            None => Uuid::new_v4().to_string(),
        };

        let span = Arc::new(TraceSpan::new(
            trace_id,
            parent_span_id.map(str::to_string),
            operation_name,
            tags,
        ));

        {
            let mut state = self.state.lock();
            let TracerState { spans, active } = &mut *state;
            // Mappings left behind by exited threads go once their span finishes
            active.retain(|_, id| spans.get(id).map_or(false, |s| !s.is_finished()));
            spans.insert(span.span_id.clone(), span.clone());
            active.insert(thread::current().id(), span.span_id.clone());
        }

        debug!(
            service = %self.service_name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            operation = %span.operation_name,
            "Span started"
        );
        Ok(span)
    }

    /// Active span of the calling thread
    pub fn get_active_span(&self) -> Option<Arc<TraceSpan>> {
        let state = self.state.lock();
        state
            .active
            .get(&thread::current().id())
            .and_then(|span_id| state.spans.get(span_id))
            .cloned()
    }

    /// Finish `span` and clear the calling thread's active mapping if it
    /// points at this span
    pub fn finish_span(&self, span: &TraceSpan) {
        if span.finish() {
            debug!(
                service = %self.service_name,
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                operation = %span.operation_name,
                duration_ms = span.duration().map(|d| d.as_secs_f64() * 1000.0).unwrap_or_default(),
                "Span finished"
            );
        }

        let mut state = self.state.lock();
        let thread_id = thread::current().id();
        if state.active.get(&thread_id) == Some(&span.span_id) {
            state.active.remove(&thread_id);
        }
    }

    /// Start a child of the active span (or a new root) and finish it when
    /// the returned guard is dropped, including during unwinding.
    pub fn span(&self, operation_name: &str, tags: Tags) -> ObservabilityResult<SpanGuard<'_>> {
        let enclosing = self.get_active_span();
        let span = match &enclosing {
            Some(parent) => self.start_span(
                operation_name,
                Some(parent.span_id()),
                tags,
                Some(parent.trace_id()),
            )?,
            None => self.start_span(operation_name, None, tags, None)?,
        };

        Ok(SpanGuard {
            tracer: self,
            span,
            enclosing,
            _not_send: PhantomData,
        })
    }

    /// Closure form of [`Tracer::span`]
    pub fn in_span<F, R>(&self, operation_name: &str, tags: Tags, f: F) -> ObservabilityResult<R>
    where
        F: FnOnce(&TraceSpan) -> R,
    {
        let guard = self.span(operation_name, tags)?;
        Ok(f(&guard))
    }

    /// Spans of one trace, oldest first; unknown ids yield an empty list
    pub fn get_spans_by_trace_id(&self, trace_id: &str) -> Vec<Arc<TraceSpan>> {
        let trace_id = trace_id.trim();
        let mut spans: Vec<Arc<TraceSpan>> = self
            .state
            .lock()
            .spans
            .values()
            .filter(|span| span.trace_id == trace_id)
            .cloned()
            .collect();
        spans.sort_by_key(|span| span.start_time);
        spans
    }

    /// Every span, oldest first
    pub fn get_all_spans(&self) -> Vec<Arc<TraceSpan>> {
        let mut spans: Vec<Arc<TraceSpan>> = self.state.lock().spans.values().cloned().collect();
        spans.sort_by_key(|span| span.start_time);
        spans
    }

    pub fn summary(&self) -> TracingSummary {
        let spans = self.get_all_spans();
        let finished_spans = spans.iter().filter(|span| span.is_finished()).count();
        let mut trace_ids: Vec<&str> = spans.iter().map(|span| span.trace_id()).collect();
        trace_ids.sort_unstable();
        trace_ids.dedup();

        TracingSummary {
            total_spans: spans.len(),
            total_traces: trace_ids.len(),
            finished_spans,
            active_spans: spans.len() - finished_spans,
        }
    }

    /// Forget every span and active mapping.
    ///
    /// A thread that exits with a span still open keeps its mapping until
    /// that span finishes and the next `start_span` prunes it, or until this
    /// is called.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.spans.clear();
        state.active.clear();
    }

    fn reactivate(&self, span: &TraceSpan) {
        let mut state = self.state.lock();
        if state.spans.contains_key(&span.span_id) {
            state
                .active
                .entry(thread::current().id())
                .or_insert_with(|| span.span_id.clone());
        }
    }
}

/// Finishes its span when dropped.
///
/// On drop the enclosing span, if still open, becomes active again so
/// sibling scopes attach to the same parent. The guard must be dropped on
/// the thread that created it.
#[must_use = "the span finishes as soon as the guard is dropped"]
pub struct SpanGuard<'a> {
    tracer: &'a Tracer,
    span: Arc<TraceSpan>,
    enclosing: Option<Arc<TraceSpan>>,
    _not_send: PhantomData<*const ()>,
}

impl SpanGuard<'_> {
    /// Shared handle to the guarded span
    pub fn handle(&self) -> Arc<TraceSpan> {
        self.span.clone()
    }
}

impl Deref for SpanGuard<'_> {
    type Target = TraceSpan;

    fn deref(&self) -> &TraceSpan {
        &self.span
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.tracer.finish_span(&self.span);
        if let Some(enclosing) = self.enclosing.take() {
            if !enclosing.is_finished() {
                self.tracer.reactivate(&enclosing);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracer() -> Tracer {
        Tracer::new("test-service").unwrap()
    }

    #[test]
    fn test_start_span_creates_root() {
        let tracer = tracer();
        let span = tracer.start_span("root", None, Tags::new(), None).unwrap();

        assert!(span.parent_span_id().is_none());
        assert!(!span.trace_id().is_empty());
        assert_ne!(span.trace_id(), span.span_id());
        assert!(span.duration().is_none());
        assert_eq!(tracer.get_active_span().unwrap().span_id(), span.span_id());
    }

    #[test]
    fn test_start_span_validates_name() {
        let tracer = tracer();
        assert!(tracer.start_span("  ", None, Tags::new(), None).is_err());
        assert!(Tracer::new("").is_err());
    }

    #[test]
    fn test_finish_is_set_once() {
        let tracer = tracer();
        let span = tracer.start_span("op", None, Tags::new(), None).unwrap();

        tracer.finish_span(&span);
        let first = span.duration().unwrap();
        let end = span.end_time().unwrap();
        assert!(!span.finish());
        assert_eq!(span.duration().unwrap(), first);
        assert_eq!(span.end_time().unwrap(), end);
        assert!(tracer.get_active_span().is_none());
    }

    #[test]
    fn test_child_shares_trace() {
        let tracer = tracer();
        let root = tracer.start_span("root", None, Tags::new(), None).unwrap();

        let child = tracer.span("child", Tags::new()).unwrap();
        assert_eq!(child.parent_span_id(), Some(root.span_id()));
        assert_eq!(child.trace_id(), root.trace_id());
    }

    #[test]
    fn test_guard_restores_enclosing_span() {
        let tracer = tracer();
        let root = tracer.start_span("root", None, Tags::new(), None).unwrap();

        {
            let _first = tracer.span("first", Tags::new()).unwrap();
        }
        let second = tracer.span("second", Tags::new()).unwrap();
        assert_eq!(second.parent_span_id(), Some(root.span_id()));
        drop(second);

        assert_eq!(tracer.get_active_span().unwrap().span_id(), root.span_id());
        assert_eq!(tracer.get_spans_by_trace_id(root.trace_id()).len(), 3);
    }

    #[test]
    fn test_span_finished_on_panic() {
        let tracer = tracer();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracer.span("explodes", Tags::new()).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());

        let spans = tracer.get_all_spans();
        assert_eq!(spans.len(), 1);
        assert!(spans[0].is_finished());
    }

    #[test]
    fn test_in_span_returns_value() {
        let tracer = tracer();
        let value = tracer
            .in_span("compute", Tags::new(), |span| {
                span.add_tag("rows", 3).unwrap();
                42
            })
            .unwrap();

        assert_eq!(value, 42);
        let spans = tracer.get_all_spans();
        assert!(spans[0].is_finished());
        assert_eq!(spans[0].tags()["rows"], json!(3));
    }

    #[test]
    fn test_tags_and_logs() {
        let tracer = tracer();
        let span = tracer.start_span("op", None, Tags::new(), None).unwrap();
        span.add_tag("user", "alice").unwrap();
        assert!(span.add_tag("", "x").is_err());

        span.add_log("cache miss", LogLevel::Warn, HashMap::new());
        span.add_log("loaded", LogLevel::Info, HashMap::from([("rows".to_string(), json!(10))]));

        let record = span.to_record();
        assert_eq!(record.tags["user"], json!("alice"));
        assert_eq!(record.logs.len(), 2);
        assert_eq!(record.logs[0].level, LogLevel::Warn);
        assert_eq!(record.logs[1].fields["rows"], json!(10));
        assert!(record.duration.is_none());
    }

    #[test]
    fn test_active_span_is_per_thread() {
        let tracer = Arc::new(tracer());
        let root = tracer.start_span("main-thread", None, Tags::new(), None).unwrap();

        let worker = tracer.clone();
        let other = std::thread::spawn(move || {
            assert!(worker.get_active_span().is_none());
            let span = worker.span("worker", Tags::new()).unwrap();
            let parent = span.parent_span_id().map(str::to_string);
            parent
        })
        .join()
        .unwrap();

        assert!(other.is_none());
        assert_eq!(tracer.get_active_span().unwrap().span_id(), root.span_id());
    }

    #[test]
    fn test_start_span_prunes_mappings_of_exited_threads() {
        let tracer = Arc::new(tracer());

        let worker = tracer.clone();
        let abandoned = std::thread::spawn(move || {
            worker.start_span("abandoned", None, Tags::new(), None).unwrap()
        })
        .join()
        .unwrap();
        assert_eq!(tracer.state.lock().active.len(), 1);

        // Finishing from another thread leaves the exited thread's mapping
        tracer.finish_span(&abandoned);
        assert_eq!(tracer.state.lock().active.len(), 1);

        let current = tracer.start_span("next", None, Tags::new(), None).unwrap();
        let state = tracer.state.lock();
        assert_eq!(state.active.len(), 1);
        assert_eq!(state.active.get(&std::thread::current().id()), Some(&current.span_id));
    }

    #[test]
    fn test_summary_counts() {
        let tracer = tracer();
        let a = tracer.start_span("a", None, Tags::new(), None).unwrap();
        tracer
            .start_span("b", Some(a.span_id()), Tags::new(), Some(a.trace_id()))
            .unwrap();
        let c = tracer.start_span("c", None, Tags::new(), None).unwrap();
        tracer.finish_span(&c);

        let summary = tracer.summary();
        assert_eq!(summary.total_spans, 3);
        assert_eq!(summary.total_traces, 2);
        assert_eq!(summary.finished_spans, 1);
        assert_eq!(summary.active_spans, 2);

        tracer.clear();
        assert_eq!(tracer.summary(), TracingSummary::default());
    }

    #[test]
    fn test_unknown_trace_is_empty() {
        let tracer = tracer();
        assert!(tracer.get_spans_by_trace_id("nope").is_empty());
    }
}
