//! mem0 REST client.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{join_url, read_json, MemoryClient};
use crate::config::Mem0Config;
use crate::errors::{ClientError, ConfigError};

/// Calls `POST /memories/` and `POST /search/` on a mem0 server.
#[derive(Debug, Clone)]
pub struct Mem0Client {
    http: reqwest::Client,
    server_url: Option<String>,
    api_key: Option<String>,
    user_id: Option<String>,
}

impl Mem0Client {
    /// Creates a client.
    #[must_use]
    pub fn new(config: &Mem0Config, http: reqwest::Client) -> Self {
        Self {
            http,
            server_url: config.server_url.clone(),
            api_key: config.api_key.clone(),
            user_id: config.user_id.clone(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        let base = self
            .server_url
            .as_deref()
            .ok_or_else(|| ConfigError::missing("MEM0_SERVER_URL"))?;

        let mut request = self.http.post(join_url(base, path)).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {key}"));
        }
        read_json(request.send().await?).await
    }
}

#[async_trait]
impl MemoryClient for Mem0Client {
    async fn add(&self, content: &str) -> Result<Value, ClientError> {
        self.post(
            "/memories/",
            json!({
                "messages": [{"role": "user", "content": content}],
                "user_id": self.user_id,
            }),
        )
        .await
    }

    async fn search(&self, query: &str) -> Result<Value, ClientError> {
        self.post(
            "/search/",
            json!({
                "query": query,
                "user_id": self.user_id,
            }),
        )
        .await
    }
}
