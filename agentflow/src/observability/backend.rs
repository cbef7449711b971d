//! Tracing backend contract and the trace/span records it produces.
//!
//! Backends are synchronous at the span boundary so a span can be closed
//! from `Drop`; network delivery, if any, happens in [`TraceBackend::flush`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use uuid::Uuid;

use crate::errors::TraceError;

/// One tracing record spanning a whole pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Trace id.
    pub id: String,
    /// Trace name.
    pub name: String,
    /// Run metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// When the trace was created.
    pub started_at: DateTime<Utc>,
}

impl Trace {
    /// Creates a trace with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            metadata,
            started_at: Utc::now(),
        }
    }
}

/// One tracing record spanning a single step, child of a [`Trace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span id.
    pub id: String,
    /// Parent trace id.
    pub trace_id: String,
    /// Span name.
    pub name: String,
    /// Span metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// When the span was opened.
    pub started_at: DateTime<Utc>,
}

impl Span {
    /// Creates a span under `trace` with a fresh id.
    #[must_use]
    pub fn new(trace: &Trace, name: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trace_id: trace.id.clone(),
            name: name.into(),
            metadata,
            started_at: Utc::now(),
        }
    }
}

/// Trait for tracing backends.
///
/// Every call is best-effort: callers log and discard errors.
#[async_trait]
pub trait TraceBackend: Send + Sync + Debug {
    /// Creates a run-level trace.
    fn create_trace(&self, name: &str, metadata: Map<String, Value>) -> Result<Trace, TraceError>;

    /// Opens a span under `trace`.
    fn open_span(
        &self,
        trace: &Trace,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Span, TraceError>;

    /// Closes a span.
    fn close_span(&self, span: &Span) -> Result<(), TraceError>;

    /// Delivers anything buffered.
    async fn flush(&self) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Logging-based tracing backend.
#[derive(Debug, Clone, Default)]
pub struct LoggingTraceBackend;

#[async_trait]
impl TraceBackend for LoggingTraceBackend {
    fn create_trace(&self, name: &str, metadata: Map<String, Value>) -> Result<Trace, TraceError> {
        let trace = Trace::new(name, metadata);
        tracing::info!(
            trace_id = %trace.id,
            trace_name = name,
            metadata = ?trace.metadata,
            "Trace started"
        );
        Ok(trace)
    }

    fn open_span(
        &self,
        trace: &Trace,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Span, TraceError> {
        let span = Span::new(trace, name, metadata);
        tracing::info!(
            trace_id = %trace.id,
            span_id = %span.id,
            span_name = name,
            "Span started"
        );
        Ok(span)
    }

    fn close_span(&self, span: &Span) -> Result<(), TraceError> {
        let duration_ms = (Utc::now() - span.started_at).num_milliseconds();
        tracing::info!(
            trace_id = %span.trace_id,
            span_id = %span.id,
            span_name = %span.name,
            duration_ms,
            "Span ended"
        );
        Ok(())
    }
}

/// Merges the deployment environment tag with caller metadata.
///
/// Caller keys win over `env`.
#[must_use]
pub fn merge_metadata(env: Option<&str>, metadata: Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    if let Some(env) = env {
        merged.insert("env".to_string(), Value::String(env.to_string()));
    }
    merged.extend(metadata);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_span_is_child_of_trace() {
        let trace = Trace::new("agent-run", Map::new());
        let span = Span::new(&trace, "llm", Map::new());

        assert_eq!(span.trace_id, trace.id);
        assert_ne!(span.id, trace.id);
    }

    #[test]
    fn test_merge_metadata() {
        let mut metadata = Map::new();
        metadata.insert("run_id".into(), json!("r1"));

        let merged = merge_metadata(Some("test"), metadata);
        assert_eq!(Value::Object(merged), json!({"env": "test", "run_id": "r1"}));
        assert!(merge_metadata(None, Map::new()).is_empty());
    }

    #[tokio::test]
    async fn test_logging_backend() {
        let backend = LoggingTraceBackend;
        let trace = backend.create_trace("agent-run", Map::new()).unwrap();
        let span = backend.open_span(&trace, "mcp", Map::new()).unwrap();

        assert!(backend.close_span(&span).is_ok());
        assert!(backend.flush().await.is_ok());
    }
}
