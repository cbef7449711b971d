//! Clients for the remote services the default steps call.
//!
//! Each collaborator sits behind a small trait so steps can be exercised
//! without a network. The concrete clients are thin request/response
//! wrappers with no state of their own.

mod mcp;
mod mem0;
mod milvus;
mod openai;

pub use mcp::{McpClient, McpTransport};
pub use mem0::Mem0Client;
pub use milvus::MilvusClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::ClientError;

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `system` or `user`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model name.
    pub model: String,
    /// Conversation.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Language-model completion endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the first choice's message content, which may be absent.
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>, ClientError>;
}

/// Long-term memory service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryClient: Send + Sync {
    /// Stores a user message; returns the raw response.
    async fn add(&self, content: &str) -> Result<Value, ClientError>;

    /// Searches stored memories; returns the raw response.
    async fn search(&self, query: &str) -> Result<Value, ClientError>;
}

/// Where vectors are written and searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    /// Collection name.
    pub collection: String,
    /// Optional partition.
    pub partition: Option<String>,
}

/// Vector database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorClient: Send + Sync {
    /// Creates the collection with an `embedding` field of `dim` if it does not exist.
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), ClientError>;

    /// Inserts one vector; returns the first primary key if the server reports one.
    async fn insert(
        &self,
        target: &CollectionTarget,
        vector: &[f64],
    ) -> Result<Option<Value>, ClientError>;

    /// Loads the collection for search.
    async fn load(&self, collection: &str) -> Result<(), ClientError>;

    /// Runs a nearest-neighbour search.
    async fn search(
        &self,
        target: &CollectionTarget,
        vector: &[f64],
        top_k: usize,
    ) -> Result<Value, ClientError>;
}

/// Tool-invocation endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Calls a tool and returns its raw result.
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ClientError>;
}

/// The client handles used by the default steps.
#[derive(Clone)]
pub struct StepClients {
    /// LLM client.
    pub llm: Arc<dyn LlmClient>,
    /// Memory client.
    pub memory: Arc<dyn MemoryClient>,
    /// Vector client.
    pub vector: Arc<dyn VectorClient>,
    /// Tool client.
    pub tool: Arc<dyn ToolClient>,
}

impl StepClients {
    /// Builds the HTTP-backed clients from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            llm: Arc::new(OpenAiClient::new(&config.llm)?),
            memory: Arc::new(Mem0Client::new(&config.mem0, http.clone())),
            vector: Arc::new(MilvusClient::new(&config.milvus, http.clone())),
            tool: Arc::new(McpClient::new(&config.mcp, http)),
        })
    }
}

impl std::fmt::Debug for StepClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepClients").finish_non_exhaustive()
    }
}

/// Reads a JSON body, turning non-success statuses into [`ClientError::Status`].
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<Value>().await?)
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/", "/memories/"), "http://h/memories/");
        assert_eq!(join_url("http://h", "/search/"), "http://h/search/");
    }

    #[test]
    fn test_chat_request_skips_missing_temperature() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::new("user", "hi")],
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_clients_from_default_config() {
        assert!(StepClients::from_config(&AppConfig::default()).is_ok());
    }
}
