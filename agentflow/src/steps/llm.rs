//! Default `llm` step.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::Step;
use crate::clients::{ChatMessage, ChatRequest, LlmClient};
use crate::config::LlmConfig;
use crate::core::{StepName, StepResult};
use crate::errors::ConfigError;
use crate::state::{AgentState, StateUpdate};

/// Sends the prompt to the completion endpoint.
///
/// On success the result carries `model` and `output_text` (which may be
/// `null` if the endpoint returned no content). On failure `output_text` is
/// `null` and `model` echoes the configured model.
pub async fn run_llm_step(
    prompt: &str,
    config: &LlmConfig,
    client: &dyn LlmClient,
    system_prompt: Option<&str>,
) -> StepResult {
    tracing::info!(step = "llm", "Step started");
    let model = config.model.clone().map_or(Value::Null, Value::String);

    let outcome = match config.model.as_deref() {
        Some(name) => {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
                messages.push(ChatMessage::new("system", system));
            }
            messages.push(ChatMessage::new("user", prompt));
            let request = ChatRequest {
                model: name.to_string(),
                messages,
                temperature: config.temperature,
            };
            client.complete(&request).await.map_err(|e| e.to_string())
        }
        None => Err(ConfigError::missing("LLM_MODEL").to_string()),
    };

    match outcome {
        Ok(text) => {
            tracing::info!(step = "llm", "Step succeeded");
            StepResult::success()
                .with_field("model", model)
                .with_field("output_text", text.map_or(Value::Null, Value::String))
        }
        Err(error) => {
            tracing::warn!(step = "llm", error = %error, "Step failed");
            StepResult::failed(error)
                .with_field("model", model)
                .with_null_fields(&["output_text"])
        }
    }
}

/// The default `llm` step.
#[derive(Clone)]
pub struct LlmStep {
    config: LlmConfig,
    client: Arc<dyn LlmClient>,
    system_prompt: Option<String>,
}

impl LlmStep {
    /// Creates the step.
    #[must_use]
    pub fn new(config: LlmConfig, client: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            client,
            system_prompt: None,
        }
    }

    /// Sets a system prompt sent before the user prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

impl std::fmt::Debug for LlmStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmStep")
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for LlmStep {
    fn name(&self) -> &str {
        StepName::Llm.as_str()
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        let result = run_llm_step(
            state.prompt(),
            &self.config,
            self.client.as_ref(),
            self.system_prompt.as_deref(),
        )
        .await;
        StateUpdate::single(StepName::Llm.output_key(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockLlmClient;
    use crate::core::StepStatus;
    use crate::errors::ClientError;
    use mockall::predicate::function;
    use serde_json::json;

    fn config() -> LlmConfig {
        LlmConfig {
            model: Some("gpt-test".into()),
            temperature: Some(0.2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_success() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .with(function(|req: &ChatRequest| {
                req.model == "gpt-test"
                    && req.messages == vec![ChatMessage::new("user", "ping")]
                    && req.temperature == Some(0.2)
            }))
            .times(1)
            .returning(|_| Ok(Some("pong".to_string())));

        let result = run_llm_step("ping", &config(), &client, None).await;

        assert_eq!(
            result.to_value(),
            json!({"status": "success", "model": "gpt-test", "output_text": "pong"})
        );
    }

    #[tokio::test]
    async fn test_system_prompt_comes_first() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .with(function(|req: &ChatRequest| {
                req.messages
                    == vec![
                        ChatMessage::new("system", "be terse"),
                        ChatMessage::new("user", "ping"),
                    ]
            }))
            .returning(|_| Ok(None));

        let result = run_llm_step("ping", &config(), &client, Some("be terse")).await;

        assert!(result.is_success());
        assert_eq!(result.get("output_text"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_client_error_becomes_failed_result() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_| Err(ClientError::remote("boom")));

        let result = run_llm_step("ping", &config(), &client, None).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("Remote error: boom"));
        assert_eq!(result.get("model"), Some(&json!("gpt-test")));
        assert_eq!(result.get("output_text"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_missing_model() {
        let mut client = MockLlmClient::new();
        client.expect_complete().never();

        let result = run_llm_step("ping", &LlmConfig::default(), &client, None).await;

        assert_eq!(result.error.as_deref(), Some("LLM_MODEL is required"));
        assert_eq!(result.get("model"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_step_writes_llm_key() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_| Ok(Some("pong".to_string())));
        let step = LlmStep::new(config(), Arc::new(client));

        let update = step.execute(&AgentState::new().with("prompt", "ping")).await;

        assert_eq!(update.get("llm").and_then(|v| v.get("output_text")), Some(&json!("pong")));
    }

    #[tokio::test]
    async fn test_step_sends_configured_system_prompt() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .with(function(|req: &ChatRequest| {
                req.messages.first() == Some(&ChatMessage::new("system", "answer in one word"))
            }))
            .times(1)
            .returning(|_| Ok(Some("pong".to_string())));
        let step = LlmStep::new(config(), Arc::new(client)).with_system_prompt("answer in one word");

        let update = step.execute(&AgentState::new().with("prompt", "ping")).await;

        assert_eq!(update.get("llm").and_then(|v| v.get("status")), Some(&json!("success")));
    }
}
