//! Default `mcp` step.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::Step;
use crate::clients::ToolClient;
use crate::config::McpConfig;
use crate::core::{StepName, StepResult};
use crate::errors::ConfigError;
use crate::state::{AgentState, StateUpdate};

/// Calls a tool with `args`.
///
/// The tool is `tool_name` when given, else the configured `MCP_TOOL_NAME`;
/// with neither, the step fails with [`ConfigError::MissingToolName`].
pub async fn run_mcp_step(
    args: &Map<String, Value>,
    config: &McpConfig,
    client: &dyn ToolClient,
    tool_name: Option<&str>,
) -> StepResult {
    tracing::info!(step = "mcp", "Step started");
    let name = tool_name
        .or(config.tool_name.as_deref())
        .filter(|n| !n.is_empty());
    let name_value = name.map_or(Value::Null, |n| Value::String(n.to_string()));

    let outcome = match name {
        Some(name) => client.call_tool(name, args).await.map_err(|e| e.to_string()),
        None => Err(ConfigError::MissingToolName.to_string()),
    };

    match outcome {
        Ok(tool_result) => {
            tracing::info!(step = "mcp", tool = ?name, "Step succeeded");
            StepResult::success()
                .with_field("tool_name", name_value)
                .with_field("tool_result", tool_result)
        }
        Err(error) => {
            tracing::warn!(step = "mcp", tool = ?name, error = %error, "Step failed");
            StepResult::failed(error)
                .with_field("tool_name", name_value)
                .with_null_fields(&["tool_result"])
        }
    }
}

/// The default `mcp` step.
#[derive(Clone)]
pub struct McpStep {
    config: McpConfig,
    client: Arc<dyn ToolClient>,
}

impl McpStep {
    /// Creates the step.
    #[must_use]
    pub fn new(config: McpConfig, client: Arc<dyn ToolClient>) -> Self {
        Self { config, client }
    }
}

impl std::fmt::Debug for McpStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpStep")
            .field("transport", &self.config.transport)
            .field("tool_name", &self.config.tool_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for McpStep {
    fn name(&self) -> &str {
        StepName::Mcp.as_str()
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        let args = state.mcp_tool_args();
        let result = run_mcp_step(&args, &self.config, self.client.as_ref(), None).await;
        StateUpdate::single(StepName::Mcp.output_key(), result)
    }
}
