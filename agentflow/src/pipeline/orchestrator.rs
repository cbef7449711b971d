//! Run orchestration: the entry point for a single agent run.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::Pipeline;
use crate::checkpoint::{build_checkpointer, CheckpointStore};
use crate::config::AppConfig;
use crate::errors::AgentflowError;
use crate::observability::{backend_from_config, Trace, TraceBackend, TraceContext, RUN_TRACE_NAME};
use crate::state::keys;
use crate::steps::StepOverrides;

/// Thread id used when none is supplied.
pub const DEFAULT_THREAD_ID: &str = "default";

/// Per-run options for [`run_agent`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Logical conversation id; defaults to [`DEFAULT_THREAD_ID`].
    pub thread_id: Option<String>,
    /// Step substitutes.
    pub overrides: StepOverrides,
    /// Checkpoint store; defaults to the configured backend.
    pub checkpointer: Option<Arc<dyn CheckpointStore>>,
    /// Trace slot shared with the caller; a fresh one is used if absent.
    pub trace_context: Option<TraceContext>,
    /// Tracing backend; defaults to Langfuse when configured.
    pub trace_backend: Option<Arc<dyn TraceBackend>>,
}

impl RunOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the thread id.
    #[must_use]
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Sets the step overrides.
    #[must_use]
    pub fn overrides(mut self, overrides: StepOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Sets the checkpoint store.
    #[must_use]
    pub fn checkpointer(mut self, checkpointer: Arc<dyn CheckpointStore>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Shares a trace context with the caller.
    #[must_use]
    pub fn trace_context(mut self, ctx: TraceContext) -> Self {
        self.trace_context = Some(ctx);
        self
    }

    /// Sets the tracing backend.
    #[must_use]
    pub fn trace_backend(mut self, backend: Arc<dyn TraceBackend>) -> Self {
        self.trace_backend = Some(backend);
        self
    }
}

/// Returns the `result` object of a final state, or an empty map.
#[must_use]
pub fn extract_result(state: &Value) -> Map<String, Value> {
    state
        .get(keys::RESULT)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Runs the pipeline once and returns its aggregated result.
///
/// A run trace named `agent-run` is created up front when tracing is
/// configured, and every step span is attached to it.
///
/// # Errors
///
/// Only structural errors: an invalid checkpoint backend or a default
/// client that cannot be constructed. Step failures are reported inside
/// the result.
pub async fn run_agent(
    initial: Map<String, Value>,
    config: &AppConfig,
    options: RunOptions,
) -> Result<Map<String, Value>, AgentflowError> {
    let RunOptions {
        thread_id,
        overrides,
        checkpointer,
        trace_context,
        trace_backend,
    } = options;

    let thread_id = thread_id
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_THREAD_ID.to_string());
    let checkpointer = match checkpointer {
        Some(store) => store,
        None => build_checkpointer(&config.checkpoint)?,
    };

    let backend = trace_backend.or_else(|| backend_from_config(&config.langfuse));
    let mut builder = Pipeline::builder(config.clone())
        .overrides(overrides)
        .checkpointer(checkpointer);
    builder = match backend {
        Some(ref backend) => builder.trace_backend(Arc::clone(backend)),
        None => builder.without_tracing(),
    };
    if let Some(trace) = backend.as_deref().and_then(|b| start_run_trace(b, &thread_id)) {
        builder = builder.run_trace(trace);
    }
    let pipeline = builder.build()?;

    let ctx = trace_context.unwrap_or_default();
    let state = pipeline.invoke(initial, &thread_id, &ctx).await;
    pipeline.flush_traces().await;

    Ok(extract_result(&state.into_value()))
}

fn start_run_trace(backend: &dyn TraceBackend, thread_id: &str) -> Option<Trace> {
    let mut metadata = Map::new();
    metadata.insert("thread_id".to_string(), json!(thread_id));
    match backend.create_trace(RUN_TRACE_NAME, metadata) {
        Ok(trace) => Some(trace),
        Err(err) => {
            tracing::warn!(thread_id, error = %err, "Failed to start run trace");
            None
        }
    }
}
