//! OpenAI-compatible chat completion client.

use async_trait::async_trait;
use std::time::Duration;

use super::{read_json, join_url, ChatRequest, LlmClient};
use crate::config::LlmConfig;
use crate::errors::{ClientError, ConfigError};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Calls `POST {endpoint}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    /// Creates a client; the configured timeout applies to every request.
    pub fn new(config: &LlmConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>, ClientError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::missing("LLM_API_KEY"))?;

        let response = self
            .http
            .post(join_url(&self.base_url, "/chat/completions"))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;
        let body = read_json(response).await?;

        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| ClientError::decode("completion has no choices"))?;
        Ok(message
            .get("content")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}
