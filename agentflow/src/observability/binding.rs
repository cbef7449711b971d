//! Per-run trace binding.
//!
//! A [`TraceContext`] holds the trace shared by every step of one run. The
//! first step to need a trace creates it (when a backend is configured) and
//! publishes it there; later steps reuse it. Each step runs inside a
//! [`SpanGuard`] that closes its span when dropped, on every exit path.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

use super::backend::{Span, Trace, TraceBackend};
use crate::core::StepName;

/// Name of the trace created for a pipeline run.
pub const RUN_TRACE_NAME: &str = "agent-run";

/// Run-scoped slot for the current trace.
///
/// Cloning shares the slot.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    current: Arc<Mutex<Option<Trace>>>,
}

impl TraceContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context already holding `trace`.
    #[must_use]
    pub fn with_trace(trace: Trace) -> Self {
        let ctx = Self::new();
        ctx.publish(trace);
        ctx
    }

    /// Returns the current trace.
    #[must_use]
    pub fn current(&self) -> Option<Trace> {
        self.current.lock().clone()
    }

    /// Publishes `trace` as current.
    pub fn publish(&self, trace: Trace) {
        *self.current.lock() = Some(trace);
    }

    /// Clears the current trace.
    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// Returns true if no trace is current.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.lock().is_none()
    }
}

/// Timer for a step span.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Closes a step span on drop.
#[derive(Debug)]
pub struct SpanGuard {
    backend: Option<Arc<dyn TraceBackend>>,
    span: Option<Span>,
    timer: SpanTimer,
}

impl SpanGuard {
    /// Returns the open span, if tracing is active.
    #[must_use]
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let (Some(backend), Some(span)) = (self.backend.as_ref(), self.span.take()) {
            if let Err(err) = backend.close_span(&span) {
                tracing::warn!(span = %span.name, error = %err, "Failed to close span");
            }
        }
        tracing::debug!(
            step = self.timer.name(),
            duration_ms = self.timer.elapsed_ms(),
            "Step span closed"
        );
    }
}

/// Decides which trace each step span belongs to.
#[derive(Debug, Clone, Default)]
pub struct TraceBinding {
    backend: Option<Arc<dyn TraceBackend>>,
    run_trace: Option<Trace>,
}

impl TraceBinding {
    /// Creates a binding.
    ///
    /// An explicit `run_trace` takes precedence over the context and is
    /// never cleared by the pipeline.
    #[must_use]
    pub fn new(backend: Option<Arc<dyn TraceBackend>>, run_trace: Option<Trace>) -> Self {
        Self { backend, run_trace }
    }

    /// Creates a binding that never traces.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns the backend, if any.
    #[must_use]
    pub fn backend(&self) -> Option<&Arc<dyn TraceBackend>> {
        self.backend.as_ref()
    }

    /// Returns true if the binding owns an explicit run trace.
    #[must_use]
    pub fn has_run_trace(&self) -> bool {
        self.run_trace.is_some()
    }

    fn active_trace(&self, ctx: &TraceContext, thread_id: &str) -> Option<Trace> {
        if let Some(ref trace) = self.run_trace {
            return Some(trace.clone());
        }
        if let Some(trace) = ctx.current() {
            return Some(trace);
        }

        let backend = self.backend.as_ref()?;
        let mut metadata = Map::new();
        metadata.insert("thread_id".to_string(), json!(thread_id));
        match backend.create_trace(RUN_TRACE_NAME, metadata) {
            Ok(trace) => {
                ctx.publish(trace.clone());
                Some(trace)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to create run trace");
                None
            }
        }
    }

    /// Opens the span for `step`.
    ///
    /// Tracing failures are logged; the returned guard is always usable.
    pub fn enter(&self, step: StepName, ctx: &TraceContext, thread_id: &str) -> SpanGuard {
        let span = self.backend.as_ref().and_then(|backend| {
            let trace = self.active_trace(ctx, thread_id)?;
            let mut metadata = Map::new();
            metadata.insert("node".to_string(), Value::String(step.to_string()));
            match backend.open_span(&trace, step.as_str(), metadata) {
                Ok(span) => Some(span),
                Err(err) => {
                    tracing::warn!(step = %step, error = %err, "Failed to open span");
                    None
                }
            }
        });

        SpanGuard {
            backend: self.backend.clone(),
            span,
            timer: SpanTimer::start(step.as_str()),
        }
    }

    /// Ends the run after the terminal step.
    ///
    /// Clears the context unless an explicit run trace was supplied, then
    /// flushes the backend.
    pub async fn finish(&self, step: StepName, ctx: &TraceContext) {
        if !step.is_terminal() {
            return;
        }
        if self.run_trace.is_none() {
            ctx.clear();
        }
        self.flush().await;
    }

    /// Flushes the backend, logging failures.
    pub async fn flush(&self) {
        if let Some(ref backend) = self.backend {
            if let Err(err) = backend.flush().await {
                tracing::warn!(error = %err, "Failed to flush traces");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTraceBackend;

    #[test]
    fn test_context_publish_and_clear() {
        let ctx = TraceContext::new();
        assert!(ctx.is_empty());

        ctx.publish(Trace::new("agent-run", Map::new()));
        assert!(!ctx.is_empty());

        let shared = ctx.clone();
        shared.clear();
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_disabled_binding_has_no_span() {
        let ctx = TraceContext::new();
        let guard = TraceBinding::disabled().enter(StepName::Llm, &ctx, "t1");

        assert!(guard.span().is_none());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_first_step_creates_trace() {
        let backend = Arc::new(RecordingTraceBackend::new());
        let binding = TraceBinding::new(Some(backend.clone()), None);
        let ctx = TraceContext::new();

        drop(binding.enter(StepName::Llm, &ctx, "t1"));
        drop(binding.enter(StepName::Mem0, &ctx, "t1"));

        let traces = backend.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].name, RUN_TRACE_NAME);
        assert_eq!(traces[0].metadata["thread_id"], "t1");
        assert_eq!(ctx.current().map(|t| t.id), Some(traces[0].id.clone()));
        assert_eq!(backend.closed_spans(), vec!["llm", "mem0"]);
    }

    #[test]
    fn test_span_closed_on_drop() {
        let backend = Arc::new(RecordingTraceBackend::new());
        let binding = TraceBinding::new(Some(backend.clone()), None);
        let ctx = TraceContext::new();

        let guard = binding.enter(StepName::Milvus, &ctx, "t1");
        assert_eq!(backend.opened_spans(), vec!["milvus"]);
        assert!(backend.closed_spans().is_empty());

        drop(guard);
        assert_eq!(backend.closed_spans(), vec!["milvus"]);
    }

    #[test]
    fn test_run_trace_takes_precedence() {
        let backend = Arc::new(RecordingTraceBackend::new());
        let run_trace = Trace::new("outer", Map::new());
        let binding = TraceBinding::new(Some(backend.clone()), Some(run_trace.clone()));
        let ctx = TraceContext::new();

        let guard = binding.enter(StepName::Mcp, &ctx, "t1");

        assert!(backend.traces().is_empty());
        assert_eq!(guard.span().map(|s| s.trace_id.clone()), Some(run_trace.id));
    }

    #[tokio::test]
    async fn test_finish_clears_only_after_terminal_step() {
        let backend = Arc::new(RecordingTraceBackend::new());
        let binding = TraceBinding::new(Some(backend.clone()), None);
        let ctx = TraceContext::new();
        drop(binding.enter(StepName::Llm, &ctx, "t1"));

        binding.finish(StepName::Mcp, &ctx).await;
        assert!(!ctx.is_empty());
        assert_eq!(backend.flushes(), 0);

        binding.finish(StepName::Final, &ctx).await;
        assert!(ctx.is_empty());
        assert_eq!(backend.flushes(), 1);
    }

    #[tokio::test]
    async fn test_finish_keeps_context_with_run_trace() {
        let run_trace = Trace::new("outer", Map::new());
        let binding = TraceBinding::new(None, Some(run_trace.clone()));
        let ctx = TraceContext::with_trace(run_trace);

        binding.finish(StepName::Final, &ctx).await;
        assert!(!ctx.is_empty());
    }
}
