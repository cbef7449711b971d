//! Mock steps and backends for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::core::{StepName, StepResult};
use crate::errors::{CheckpointError, TraceError};
use crate::observability::{Span, Trace, TraceBackend};
use crate::state::{AgentState, StateUpdate};
use crate::steps::Step;

/// Shared, ordered record of which steps ran.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn record(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }

    /// Returns the calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// A step that returns a preset update.
#[derive(Debug, Clone)]
pub struct FixedStep {
    name: StepName,
    update: StateUpdate,
}

impl FixedStep {
    /// Creates a step returning `update`.
    #[must_use]
    pub fn new(name: StepName, update: StateUpdate) -> Self {
        Self { name, update }
    }

    /// Creates a step writing `result` under its own output key.
    #[must_use]
    pub fn with_result(name: StepName, result: StepResult) -> Self {
        Self::new(name, StateUpdate::single(name.output_key(), result))
    }

    /// Creates a step writing `{"status": "success"}` under its own key.
    #[must_use]
    pub fn success(name: StepName) -> Self {
        Self::with_result(name, StepResult::success())
    }

    /// Creates a step writing a failed result under its own key.
    #[must_use]
    pub fn failed(name: StepName, error: impl Into<String>) -> Self {
        Self::with_result(name, StepResult::failed(error))
    }
}

#[async_trait]
impl Step for FixedStep {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn execute(&self, _state: &AgentState) -> StateUpdate {
        self.update.clone()
    }
}

/// A step that logs each call and the state it saw.
#[derive(Debug)]
pub struct RecordingStep {
    name: StepName,
    log: CallLog,
    seen: Mutex<Vec<Value>>,
}

impl RecordingStep {
    /// Creates a recording step writing to `log`.
    #[must_use]
    pub fn new(name: StepName, log: CallLog) -> Self {
        Self {
            name,
            log,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the state snapshots passed to each call.
    #[must_use]
    pub fn seen_states(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        self.log.record(self.name.as_str());
        self.seen.lock().push(state.snapshot());
        StateUpdate::single(
            self.name.output_key(),
            json!({"status": "success", "step": self.name.as_str()}),
        )
    }
}

/// A step that panics.
#[derive(Debug, Clone)]
pub struct PanickingStep {
    name: StepName,
    message: String,
}

impl PanickingStep {
    /// Creates a panicking step.
    #[must_use]
    pub fn new(name: StepName, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Step for PanickingStep {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn execute(&self, _state: &AgentState) -> StateUpdate {
        panic!("{}", self.message);
    }
}

#[derive(Debug, Default)]
struct Recorded {
    traces: Vec<Trace>,
    opened: Vec<String>,
    closed: Vec<String>,
    flushes: usize,
}

/// A tracing backend that records every call in memory.
#[derive(Debug, Default)]
pub struct RecordingTraceBackend {
    recorded: Mutex<Recorded>,
    fail: bool,
}

impl RecordingTraceBackend {
    /// Creates a recording backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            recorded: Mutex::default(),
            fail: true,
        }
    }

    /// Returns the traces created.
    #[must_use]
    pub fn traces(&self) -> Vec<Trace> {
        self.recorded.lock().traces.clone()
    }

    /// Returns the names of spans opened, in order.
    #[must_use]
    pub fn opened_spans(&self) -> Vec<String> {
        self.recorded.lock().opened.clone()
    }

    /// Returns the names of spans closed, in order.
    #[must_use]
    pub fn closed_spans(&self) -> Vec<String> {
        self.recorded.lock().closed.clone()
    }

    /// Returns the number of flushes.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.recorded.lock().flushes
    }

    fn check(&self) -> Result<(), TraceError> {
        if self.fail {
            return Err(TraceError::backend("recording backend configured to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl TraceBackend for RecordingTraceBackend {
    fn create_trace(&self, name: &str, metadata: Map<String, Value>) -> Result<Trace, TraceError> {
        self.check()?;
        let trace = Trace::new(name, metadata);
        self.recorded.lock().traces.push(trace.clone());
        Ok(trace)
    }

    fn open_span(
        &self,
        trace: &Trace,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Span, TraceError> {
        self.check()?;
        self.recorded.lock().opened.push(name.to_string());
        Ok(Span::new(trace, name, metadata))
    }

    fn close_span(&self, span: &Span) -> Result<(), TraceError> {
        self.check()?;
        self.recorded.lock().closed.push(span.name.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), TraceError> {
        self.check()?;
        self.recorded.lock().flushes += 1;
        Ok(())
    }
}

/// A checkpoint store whose every call fails.
#[derive(Debug, Default)]
pub struct FailingCheckpointStore;

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    async fn put(&self, _checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        Err(CheckpointError::Io(std::io::Error::other("disk full")))
    }

    async fn get(&self, _thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Err(CheckpointError::Io(std::io::Error::other("disk unreadable")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_step() {
        let log = CallLog::new();
        let step = RecordingStep::new(StepName::Mem0, log.clone());
        let state = AgentState::new().with("prompt", "ping");

        let update = step.execute(&state).await;

        assert_eq!(log.calls(), vec!["mem0"]);
        assert_eq!(step.execution_count(), 1);
        assert_eq!(step.seen_states()[0]["prompt"], "ping");
        assert_eq!(update.get("mem0"), Some(&json!({"status": "success", "step": "mem0"})));
    }

    #[tokio::test]
    async fn test_fixed_step() {
        let step = FixedStep::failed(StepName::Llm, "boom");

        let update = step.execute(&AgentState::new()).await;

        assert_eq!(update.get("llm"), Some(&json!({"status": "failed", "error": "boom"})));
    }

    #[tokio::test]
    async fn test_failing_trace_backend() {
        let backend = RecordingTraceBackend::failing();

        assert!(backend.create_trace("t", Map::new()).is_err());
        assert!(backend.flush().await.is_err());
        assert!(backend.traces().is_empty());
    }
}
