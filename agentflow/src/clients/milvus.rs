//! Milvus RESTful API (v2) client.
//!
//! Every response is wrapped in `{"code": 0, "data": ...}`; a non-zero code
//! is reported as [`ClientError::Remote`].

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{join_url, read_json, CollectionTarget, VectorClient};
use crate::config::MilvusConfig;
use crate::errors::{ClientError, ConfigError};

/// Name of the vector field in collections created by this client.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Thin wrapper over `/v2/vectordb/*`.
#[derive(Debug, Clone)]
pub struct MilvusClient {
    http: reqwest::Client,
    config: MilvusConfig,
}

impl MilvusClient {
    /// Creates a client.
    #[must_use]
    pub fn new(config: &MilvusConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config: config.clone(),
        }
    }

    fn base_url(&self) -> Result<String, ClientError> {
        let host = self
            .config
            .host
            .as_deref()
            .ok_or_else(|| ConfigError::missing("MILVUS_HOST"))?;
        if host.starts_with("http://") || host.starts_with("https://") {
            return Ok(host.to_string());
        }
        let port = self
            .config
            .port
            .ok_or_else(|| ConfigError::missing("MILVUS_PORT"))?;
        Ok(format!("http://{host}:{port}"))
    }

    async fn call(&self, path: &str, mut body: Map<String, Value>) -> Result<Value, ClientError> {
        if let Some(ref db) = self.config.db_name {
            body.insert("dbName".to_string(), json!(db));
        }

        let mut request = self
            .http
            .post(join_url(&self.base_url()?, path))
            .json(&Value::Object(body));
        if let Some(ref user) = self.config.username {
            let password = self.config.password.as_deref().unwrap_or("");
            request = request.bearer_auth(format!("{user}:{password}"));
        }

        unwrap_envelope(read_json(request.send().await?).await?)
    }
}

/// Extracts `data` from a Milvus response envelope.
fn unwrap_envelope(response: Value) -> Result<Value, ClientError> {
    let code = response.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ClientError::remote(format!("milvus code {code}: {message}")));
    }
    Ok(response.get("data").cloned().unwrap_or(Value::Null))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl VectorClient for MilvusClient {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), ClientError> {
        let has = self
            .call(
                "/v2/vectordb/collections/has",
                object(json!({"collectionName": collection})),
            )
            .await?;
        if has.get("has").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }

        tracing::info!(collection, dim, "Creating milvus collection");
        self.call(
            "/v2/vectordb/collections/create",
            object(json!({
                "collectionName": collection,
                "description": "agent vectors",
                "schema": {
                    "autoId": true,
                    "enableDynamicField": false,
                    "fields": [
                        {"fieldName": "id", "dataType": "Int64", "isPrimary": true},
                        {
                            "fieldName": EMBEDDING_FIELD,
                            "dataType": "FloatVector",
                            "elementTypeParams": {"dim": dim.to_string()}
                        }
                    ]
                },
                "indexParams": [{
                    "fieldName": EMBEDDING_FIELD,
                    "indexName": EMBEDDING_FIELD,
                    "metricType": "L2",
                    "params": {"index_type": "IVF_FLAT", "nlist": 128}
                }]
            })),
        )
        .await?;
        Ok(())
    }

    async fn insert(
        &self,
        target: &CollectionTarget,
        vector: &[f64],
    ) -> Result<Option<Value>, ClientError> {
        let mut body = object(json!({
            "collectionName": target.collection,
            "data": [{EMBEDDING_FIELD: vector}],
        }));
        if let Some(ref partition) = target.partition {
            body.insert("partitionName".to_string(), json!(partition));
        }

        let data = self.call("/v2/vectordb/entities/insert", body).await?;
        Ok(data
            .get("insertIds")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .cloned())
    }

    async fn load(&self, collection: &str) -> Result<(), ClientError> {
        self.call(
            "/v2/vectordb/collections/load",
            object(json!({"collectionName": collection})),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        target: &CollectionTarget,
        vector: &[f64],
        top_k: usize,
    ) -> Result<Value, ClientError> {
        let mut body = object(json!({
            "collectionName": target.collection,
            "data": [vector],
            "annsField": EMBEDDING_FIELD,
            "limit": top_k,
            "searchParams": {"metricType": "L2", "params": {"nprobe": 10}},
        }));
        if let Some(ref partition) = target.partition {
            body.insert("partitionNames".to_string(), json!([partition]));
        }

        self.call("/v2/vectordb/entities/search", body).await
    }
}
