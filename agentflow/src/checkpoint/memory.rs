//! In-memory checkpoint store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Checkpoint, CheckpointStore};
use crate::errors::CheckpointError;

/// Keeps checkpoints in process memory; lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of threads with a checkpoint.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Returns true if no checkpoint has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.checkpoints.get(thread_id).map(|c| c.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepName;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryCheckpointStore::new();
        store
            .put(Checkpoint::new("t1", json!({"prompt": "a"}), Some(StepName::Llm)))
            .await
            .unwrap();
        store
            .put(Checkpoint::new("t1", json!({"prompt": "b"}), Some(StepName::Mem0)))
            .await
            .unwrap();

        let saved = store.get("t1").await.unwrap().unwrap();
        assert_eq!(saved.state, json!({"prompt": "b"}));
        assert_eq!(saved.step, Some(StepName::Mem0));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = MemoryCheckpointStore::new();
        store.put(Checkpoint::new("t1", json!({}), None)).await.unwrap();

        assert!(store.get("t2").await.unwrap().is_none());
    }
}
