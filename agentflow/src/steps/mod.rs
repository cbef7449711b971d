//! Step trait and the default steps.
//!
//! Steps are the units of work of the pipeline. Each reads the shared
//! [`AgentState`] and returns a namespaced [`StateUpdate`]; failures are
//! reported inside the update, never as a Rust error.

mod final_step;
mod llm;
mod mcp;
mod mem0;
mod milvus;
pub mod registry;

pub use final_step::FinalStep;
pub use llm::{run_llm_step, LlmStep};
pub use mcp::{run_mcp_step, McpStep};
pub use mem0::{run_mem0_step, Mem0Step};
pub use milvus::{run_milvus_step, MilvusStep, DEFAULT_TOP_K};
pub use registry::{StepOverrides, StepRegistry};

use async_trait::async_trait;
use std::fmt::Debug;

use crate::state::{AgentState, StateUpdate};

/// Trait for pipeline steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns a label for logs.
    fn name(&self) -> &str;

    /// Executes the step against the current state.
    async fn execute(&self, state: &AgentState) -> StateUpdate;
}

/// A simple function-based step.
pub struct FnStep<F>
where
    F: Fn(&AgentState) -> StateUpdate + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&AgentState) -> StateUpdate + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&AgentState) -> StateUpdate + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&AgentState) -> StateUpdate + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        (self.func)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep::new("echo", |state: &AgentState| {
            StateUpdate::single("echo", state.prompt())
        });
        let state = AgentState::new().with("prompt", "ping");

        let update = step.execute(&state).await;

        assert_eq!(step.name(), "echo");
        assert_eq!(update.get("echo"), Some(&json!("ping")));
        assert!(format!("{step:?}").contains("echo"));
    }

    #[test]
    fn test_fn_step_behind_trait_object() {
        let step: Arc<dyn Step> = Arc::new(FnStep::new("count", |state: &AgentState| {
            StateUpdate::single("count", state.as_map().len())
        }));
        let state = AgentState::new().with("a", 1).with("b", 2);

        let update = tokio_test::block_on(step.execute(&state));

        assert_eq!(update.get("count"), Some(&json!(2)));
    }
}
