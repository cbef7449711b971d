//! Pipeline execution.

use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::PipelineBuilder;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::AppConfig;
use crate::core::{StepName, StepResult};
use crate::errors::CheckpointError;
use crate::observability::{TraceBinding, TraceContext};
use crate::state::{AgentState, StateUpdate};
use crate::steps::{Step, StepRegistry};

/// The fixed `llm → mem0 → milvus → mcp → final` pipeline.
///
/// Built once, invoked any number of times; each invocation gets its own
/// state and trace context.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(super) registry: StepRegistry,
    pub(super) binding: TraceBinding,
    pub(super) checkpointer: Option<Arc<dyn CheckpointStore>>,
}

impl Pipeline {
    /// Creates a builder.
    #[must_use]
    pub fn builder(config: AppConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Returns the resolved steps.
    #[must_use]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Runs every step once, in order.
    ///
    /// Never fails: step failures and panics are recorded in the state,
    /// and tracing or checkpoint failures are logged.
    pub async fn invoke(
        &self,
        initial: Map<String, Value>,
        thread_id: &str,
        ctx: &TraceContext,
    ) -> AgentState {
        let mut state = AgentState::from_map(initial);
        if let Some(previous) = self.load_checkpoint(thread_id).await {
            tracing::info!(thread_id, "Resuming from checkpoint");
            state.seed_from(previous);
        }

        tracing::info!(thread_id, "Pipeline run started");
        for (name, step) in self.registry.iter() {
            let update = self.run_step(name, step.as_ref(), &state, thread_id, ctx).await;

            let outcome = state.merge(name, update);
            for conflict in &outcome.conflicts {
                tracing::warn!(step = %name, key = %conflict.key, error = %conflict, "Dropped conflicting write");
            }

            self.save_checkpoint(thread_id, &state, name).await;
        }
        tracing::info!(thread_id, "Pipeline run finished");

        state
    }

    async fn run_step(
        &self,
        name: StepName,
        step: &dyn Step,
        state: &AgentState,
        thread_id: &str,
        ctx: &TraceContext,
    ) -> StateUpdate {
        let guard = self.binding.enter(name, ctx, thread_id);
        tracing::debug!(step = %name, implementation = step.name(), "Executing step");

        let update = match AssertUnwindSafe(step.execute(state)).catch_unwind().await {
            Ok(update) => update,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(step = %name, error = %message, "Step panicked");
                StateUpdate::single(
                    name.output_key(),
                    StepResult::failed(format!("step panicked: {message}")),
                )
            }
        };

        drop(guard);
        self.binding.finish(name, ctx).await;
        update
    }

    async fn load_checkpoint(&self, thread_id: &str) -> Option<Map<String, Value>> {
        let store = self.checkpointer.as_ref()?;
        match store.get(thread_id).await {
            Ok(Some(checkpoint)) => match checkpoint.state {
                Value::Object(map) => Some(map),
                _ => None,
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(thread_id, error = %err, "Failed to load checkpoint");
                None
            }
        }
    }

    async fn save_checkpoint(&self, thread_id: &str, state: &AgentState, step: StepName) {
        let Some(ref store) = self.checkpointer else {
            return;
        };
        let checkpoint = Checkpoint::new(thread_id, state.snapshot(), Some(step));
        if let Err(err) = store.put(checkpoint).await {
            tracing::warn!(thread_id, step = %step, error = %err, "Failed to write checkpoint");
        }
    }

    /// Returns the last checkpoint written for `thread_id`.
    pub async fn snapshot(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        match self.checkpointer {
            Some(ref store) => store.get(thread_id).await,
            None => Ok(None),
        }
    }

    /// Flushes buffered trace events.
    pub async fn flush_traces(&self) {
        self.binding.flush().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
