//! Default `mem0` step.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::Step;
use crate::clients::MemoryClient;
use crate::core::{StepName, StepResult};
use crate::errors::ClientError;
use crate::state::{AgentState, StateUpdate};

const FIELDS: &[&str] = &["memory_id", "query_result"];

/// Stores `content` as a user message, then searches with `query`.
///
/// `memory_id` is the `id` of the add response when it is an object.
pub async fn run_mem0_step(content: &str, query: &str, client: &dyn MemoryClient) -> StepResult {
    tracing::info!(step = "mem0", "Step started");

    match add_then_search(content, query, client).await {
        Ok((memory_id, query_result)) => {
            tracing::info!(step = "mem0", "Step succeeded");
            StepResult::success()
                .with_field("memory_id", memory_id)
                .with_field("query_result", query_result)
        }
        Err(err) => {
            tracing::warn!(step = "mem0", error = %err, "Step failed");
            StepResult::failed(err.to_string()).with_null_fields(FIELDS)
        }
    }
}

async fn add_then_search(
    content: &str,
    query: &str,
    client: &dyn MemoryClient,
) -> Result<(Value, Value), ClientError> {
    let added = client.add(content).await?;
    let memory_id = added.get("id").cloned().unwrap_or(Value::Null);
    let found = client.search(query).await?;
    Ok((memory_id, found))
}

/// The default `mem0` step.
#[derive(Clone)]
pub struct Mem0Step {
    client: Arc<dyn MemoryClient>,
}

impl Mem0Step {
    /// Creates the step.
    #[must_use]
    pub fn new(client: Arc<dyn MemoryClient>) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for Mem0Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem0Step").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for Mem0Step {
    fn name(&self) -> &str {
        StepName::Mem0.as_str()
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        let result = run_mem0_step(state.mem0_content(), state.mem0_query(), self.client.as_ref()).await;
        StateUpdate::single(StepName::Mem0.output_key(), result)
    }
}
