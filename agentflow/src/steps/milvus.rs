//! Default `milvus` step.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::Step;
use crate::clients::{CollectionTarget, VectorClient};
use crate::config::MilvusConfig;
use crate::core::{StepName, StepResult};
use crate::state::{AgentState, StateUpdate};

/// Number of neighbours returned by the search.
pub const DEFAULT_TOP_K: usize = 3;

const FIELDS: &[&str] = &["write_id", "query_result"];

/// Inserts `vector`, then searches with `query_vector` (or `vector`).
///
/// The collection is created on first use with a dimension equal to the
/// inserted vector's length.
pub async fn run_milvus_step(
    vector: &[f64],
    query_vector: Option<&[f64]>,
    config: &MilvusConfig,
    client: &dyn VectorClient,
    top_k: usize,
) -> StepResult {
    tracing::info!(step = "milvus", "Step started");

    match insert_then_search(vector, query_vector, config, client, top_k).await {
        Ok((write_id, query_result)) => {
            tracing::info!(step = "milvus", "Step succeeded");
            StepResult::success()
                .with_field("write_id", write_id)
                .with_field("query_result", query_result)
        }
        Err(error) => {
            tracing::warn!(step = "milvus", error = %error, "Step failed");
            StepResult::failed(error).with_null_fields(FIELDS)
        }
    }
}

fn validate(config: &MilvusConfig) -> Result<CollectionTarget, String> {
    let has_url = config
        .host
        .as_deref()
        .is_some_and(|h| h.starts_with("http://") || h.starts_with("https://"));
    if config.host.is_none() || (config.port.is_none() && !has_url) {
        return Err("MILVUS_HOST and MILVUS_PORT are required".to_string());
    }
    let collection = config
        .collection
        .clone()
        .ok_or_else(|| "MILVUS_COLLECTION is required".to_string())?;
    Ok(CollectionTarget {
        collection,
        partition: config.partition.clone(),
    })
}

async fn insert_then_search(
    vector: &[f64],
    query_vector: Option<&[f64]>,
    config: &MilvusConfig,
    client: &dyn VectorClient,
    top_k: usize,
) -> Result<(Value, Value), String> {
    let target = validate(config)?;

    client
        .ensure_collection(&target.collection, vector.len())
        .await
        .map_err(|e| e.to_string())?;
    let write_id = client
        .insert(&target, vector)
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or(Value::Null);
    client
        .load(&target.collection)
        .await
        .map_err(|e| e.to_string())?;

    let search_vector = query_vector.unwrap_or(vector);
    let found = client
        .search(&target, search_vector, top_k)
        .await
        .map_err(|e| e.to_string())?;

    Ok((write_id, found))
}

/// The default `milvus` step.
#[derive(Clone)]
pub struct MilvusStep {
    config: MilvusConfig,
    client: Arc<dyn VectorClient>,
    top_k: usize,
}

impl MilvusStep {
    /// Creates the step with [`DEFAULT_TOP_K`].
    #[must_use]
    pub fn new(config: MilvusConfig, client: Arc<dyn VectorClient>) -> Self {
        Self {
            config,
            client,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Overrides the number of search results.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

impl std::fmt::Debug for MilvusStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MilvusStep")
            .field("collection", &self.config.collection)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for MilvusStep {
    fn name(&self) -> &str {
        StepName::Milvus.as_str()
    }

    async fn execute(&self, state: &AgentState) -> StateUpdate {
        let vector = state.milvus_vector();
        let query_vector = state.milvus_query_vector();
        let result = run_milvus_step(
            &vector,
            query_vector.as_deref(),
            &self.config,
            self.client.as_ref(),
            self.top_k,
        )
        .await;
        StateUpdate::single(StepName::Milvus.output_key(), result)
    }
}
