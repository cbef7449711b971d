//! Checkpoint stores.
//!
//! A checkpoint is the pipeline state as of the last completed step of a
//! thread. Each thread id has at most one checkpoint; writes overwrite.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use crate::config::CheckpointConfig;
use crate::core::StepName;
use crate::errors::{AgentflowError, CheckpointError, ConfigError};

/// Saved pipeline state for one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Logical conversation id.
    pub thread_id: String,
    /// State snapshot.
    pub state: Value,
    /// Step after which the snapshot was taken.
    pub step: Option<StepName>,
    /// When the snapshot was written.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a checkpoint stamped now.
    #[must_use]
    pub fn new(thread_id: impl Into<String>, state: Value, step: Option<StepName>) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            step,
            updated_at: Utc::now(),
        }
    }
}

/// Persists and restores pipeline state keyed by thread id.
#[async_trait]
pub trait CheckpointStore: Send + Sync + Debug {
    /// Writes `checkpoint`, replacing any earlier one for the same thread.
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Returns the checkpoint for `thread_id`.
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// Checkpoint backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointBackendKind {
    /// Process memory.
    Memory,
    /// `SQLite` database file.
    Sqlite,
}

impl CheckpointBackendKind {
    /// Parses a backend name; unset or blank means [`Memory`](Self::Memory).
    pub fn parse(name: Option<&str>) -> Result<Self, ConfigError> {
        let raw = name.unwrap_or("memory");
        match raw.trim().to_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::UnsupportedCheckpointBackend(raw.to_string())),
        }
    }
}

/// Builds the configured checkpoint store.
///
/// # Errors
///
/// - [`ConfigError::UnsupportedCheckpointBackend`] for an unknown backend.
/// - [`ConfigError::MissingCheckpointPath`] for `sqlite` without a path.
/// - [`AgentflowError::CapabilityUnavailable`] for `sqlite` when the crate
///   was built without the `sqlite` feature.
pub fn build_checkpointer(config: &CheckpointConfig) -> Result<Arc<dyn CheckpointStore>, AgentflowError> {
    match CheckpointBackendKind::parse(config.backend.as_deref())? {
        CheckpointBackendKind::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
        CheckpointBackendKind::Sqlite => {
            let path = config
                .path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or(ConfigError::MissingCheckpointPath)?;
            ensure_sqlite(cfg!(feature = "sqlite"))?;
            open_sqlite(path)
        }
    }
}

fn sqlite_unavailable() -> AgentflowError {
    AgentflowError::capability_unavailable(
        "sqlite checkpoint store",
        "rebuild agentflow with the `sqlite` feature",
    )
}

fn ensure_sqlite(available: bool) -> Result<(), AgentflowError> {
    if available {
        Ok(())
    } else {
        Err(sqlite_unavailable())
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &str) -> Result<Arc<dyn CheckpointStore>, AgentflowError> {
    tracing::info!(path, "Opening sqlite checkpoint store");
    Ok(Arc::new(SqliteCheckpointStore::open(path)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_path: &str) -> Result<Arc<dyn CheckpointStore>, AgentflowError> {
    Err(sqlite_unavailable())
}
