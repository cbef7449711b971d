//! `SQLite` checkpoint store. One row per thread.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use super::{Checkpoint, CheckpointStore};
use crate::core::StepName;
use crate::errors::CheckpointError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id  TEXT PRIMARY KEY,
    state_json TEXT NOT NULL,
    step       TEXT,
    updated_at TEXT NOT NULL
);";

/// Stores checkpoints in a `SQLite` database file.
#[derive(Debug)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `op` against the connection on the blocking pool.
    async fn run_blocking<T, F>(&self, op: F) -> Result<T, CheckpointError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CheckpointError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&conn.lock()))
            .await
            .map_err(|err| CheckpointError::Task(err.to_string()))?
    }
}

fn parse_row(
    thread_id: String,
    state_json: &str,
    step: Option<String>,
    updated_at: &str,
) -> Result<Checkpoint, CheckpointError> {
    let step = step
        .map(|s| s.parse::<StepName>())
        .transpose()
        .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
    let updated_at = DateTime::parse_from_rfc3339(updated_at)
        .map_err(|e| CheckpointError::Serialization(format!("invalid updated_at: {e}")))?
        .with_timezone(&Utc);

    Ok(Checkpoint {
        thread_id,
        state: serde_json::from_str(state_json)?,
        step,
        updated_at,
    })
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let state_json = serde_json::to_string(&checkpoint.state)?;
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints(thread_id, state_json, step, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE SET
                   state_json = excluded.state_json,
                   step = excluded.step,
                   updated_at = excluded.updated_at",
                params![
                    checkpoint.thread_id,
                    state_json,
                    checkpoint.step.map(StepName::as_str),
                    checkpoint.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let thread_id = thread_id.to_string();
        self.run_blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT state_json, step, updated_at FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                    |row| {
                        let state_json: String = row.get(0)?;
                        let step: Option<String> = row.get(1)?;
                        let updated_at: String = row.get(2)?;
                        Ok((state_json, step, updated_at))
                    },
                )
                .optional()?;

            row.map(|(state_json, step, updated_at)| {
                parse_row(thread_id, &state_json, step, &updated_at)
            })
            .transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::open(dir.path().join("cp.db")).unwrap();

        assert!(store.get("t1").await.unwrap().is_none());

        store
            .put(Checkpoint::new("t1", json!({"prompt": "a"}), Some(StepName::Llm)))
            .await
            .unwrap();
        store
            .put(Checkpoint::new("t1", json!({"prompt": "b", "n": [1, 2]}), Some(StepName::Final)))
            .await
            .unwrap();

        let saved = store.get("t1").await.unwrap().unwrap();
        assert_eq!(saved.state, json!({"prompt": "b", "n": [1, 2]}));
        assert_eq!(saved.step, Some(StepName::Final));

        let count: i64 = store
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_threads_write_their_own_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteCheckpointStore::open(dir.path().join("cp.db")).unwrap());

        let writes = (0..8).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .put(Checkpoint::new(format!("t{i}"), json!({"i": i}), Some(StepName::Mcp)))
                    .await
            })
        });
        for write in futures::future::join_all(writes).await {
            write.unwrap().unwrap();
        }

        for i in 0..8 {
            let saved = store.get(&format!("t{i}")).await.unwrap().unwrap();
            assert_eq!(saved.state, json!({"i": i}));
        }
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cp.db");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.put(Checkpoint::new("t1", json!({"k": 1}), None)).await.unwrap();
        }

        let reopened = SqliteCheckpointStore::open(&path).unwrap();
        let saved = reopened.get("t1").await.unwrap().unwrap();
        assert_eq!(saved.state, json!({"k": 1}));
        assert_eq!(saved.step, None);
    }
}
