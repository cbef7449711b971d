//! Langfuse backend.
//!
//! Events are buffered as ingestion records and posted in one batch to
//! `POST {host}/api/public/ingestion` on flush.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::backend::{merge_metadata, Span, Trace, TraceBackend};
use crate::config::LangfuseConfig;
use crate::errors::TraceError;

/// Buffers Langfuse ingestion events and posts them on flush.
#[derive(Debug)]
pub struct LangfuseBackend {
    http: reqwest::Client,
    host: String,
    public_key: String,
    secret_key: String,
    env: Option<String>,
    pending: Mutex<Vec<Value>>,
}

impl LangfuseBackend {
    /// Creates a backend, or [`TraceError::Disabled`] unless keys and host are all set.
    pub fn new(config: &LangfuseConfig, http: reqwest::Client) -> Result<Self, TraceError> {
        match (&config.public_key, &config.secret_key, &config.host) {
            (Some(public_key), Some(secret_key), Some(host)) => Ok(Self {
                http,
                host: host.trim_end_matches('/').to_string(),
                public_key: public_key.clone(),
                secret_key: secret_key.clone(),
                env: config.env.clone(),
                pending: Mutex::new(Vec::new()),
            }),
            _ => {
                tracing::info!("langfuse disabled: missing config");
                Err(TraceError::Disabled)
            }
        }
    }

    /// Returns the number of buffered events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn push(&self, kind: &str, body: Value) {
        self.pending.lock().push(json!({
            "id": Uuid::new_v4().to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "type": kind,
            "body": body,
        }));
    }
}

#[async_trait]
impl TraceBackend for LangfuseBackend {
    fn create_trace(&self, name: &str, metadata: Map<String, Value>) -> Result<Trace, TraceError> {
        let trace = Trace::new(name, merge_metadata(self.env.as_deref(), metadata));
        let mut body = json!({
            "id": trace.id,
            "name": trace.name,
            "timestamp": trace.started_at.to_rfc3339(),
            "metadata": trace.metadata,
        });
        if let Some(ref env) = self.env {
            body["environment"] = json!(env);
        }
        self.push("trace-create", body);
        Ok(trace)
    }

    fn open_span(
        &self,
        trace: &Trace,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<Span, TraceError> {
        let span = Span::new(trace, name, metadata);
        self.push(
            "span-create",
            json!({
                "id": span.id,
                "traceId": span.trace_id,
                "name": span.name,
                "startTime": span.started_at.to_rfc3339(),
                "metadata": span.metadata,
            }),
        );
        Ok(span)
    }

    fn close_span(&self, span: &Span) -> Result<(), TraceError> {
        self.push(
            "span-update",
            json!({
                "id": span.id,
                "traceId": span.trace_id,
                "endTime": Utc::now().to_rfc3339(),
            }),
        );
        Ok(())
    }

    async fn flush(&self) -> Result<(), TraceError> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let response = self
            .http
            .post(format!("{}/api/public/ingestion", self.host))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TraceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // 207 carries per-event errors
        let rejected = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("errors").and_then(Value::as_array).map(Vec::len))
            .unwrap_or(0);
        if rejected > 0 {
            return Err(TraceError::backend(format!(
                "langfuse rejected {rejected} of {count} events"
            )));
        }

        tracing::debug!(events = count, "langfuse batch delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(host: &str) -> LangfuseConfig {
        LangfuseConfig {
            public_key: Some("pk".into()),
            secret_key: Some("sk".into()),
            host: Some(host.into()),
            env: Some("test".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_without_keys() {
        let err = LangfuseBackend::new(&LangfuseConfig::default(), reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, TraceError::Disabled));
    }

    #[test]
    fn test_trace_metadata_includes_env() {
        let backend = LangfuseBackend::new(&config("http://langfuse.local"), reqwest::Client::new()).unwrap();
        let mut metadata = Map::new();
        metadata.insert("thread_id".into(), json!("t1"));

        let trace = backend.create_trace("agent-run", metadata).unwrap();
        assert_eq!(Value::Object(trace.metadata), json!({"env": "test", "thread_id": "t1"}));
        assert_eq!(backend.pending(), 1);
    }

    #[tokio::test]
    async fn test_flush_posts_batch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                // base64("pk:sk")
                when.method(POST)
                    .path("/api/public/ingestion")
                    .header("Authorization", "Basic cGs6c2s=");
                then.status(207).json_body(json!({"successes": [], "errors": []}));
            })
            .await;

        let backend = LangfuseBackend::new(&config(&server.base_url()), reqwest::Client::new()).unwrap();
        let trace = backend.create_trace("agent-run", Map::new()).unwrap();
        let span = backend.open_span(&trace, "llm", Map::new()).unwrap();
        backend.close_span(&span).unwrap();
        assert_eq!(backend.pending(), 3);

        backend.flush().await.unwrap();

        mock.assert_async().await;
        assert_eq!(backend.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_reports_server_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/public/ingestion");
                then.status(500).body("langfuse down");
            })
            .await;

        let backend = LangfuseBackend::new(&config(&server.base_url()), reqwest::Client::new()).unwrap();
        backend.create_trace("agent-run", Map::new()).unwrap();

        let err = backend.flush().await.unwrap_err();
        assert!(err.to_string().contains("langfuse down"));
    }
}
