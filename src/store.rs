use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::model::TaskId;

/// Persisted record of one successfully submitted task.
///
/// Written exactly once per task and never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub task: String,
    pub marked_at: DateTime<Utc>,
}

/// Durable set of task identifiers already submitted.
///
/// Presence of an identifier means the task must never be re-offered by the
/// task source, on this or any future run. A store that cannot be reached is
/// fatal: without it the at-most-once guarantee is gone.
#[async_trait]
pub trait CompletionStore: Send + Sync {
    async fn is_completed(&self, id: &TaskId) -> Result<bool>;

    /// Mark a task completed. Idempotent: marking an already-marked id is a
    /// no-op, never an error.
    async fn mark_completed(&self, id: &TaskId) -> Result<()>;

    /// Cumulative number of records across all runs
    async fn completed_count(&self) -> Result<u64>;

    async fn flush(&self) -> Result<()>;
}

/// Sled-backed completion store: one tree of normalized identifiers,
/// append-only via insert-if-absent.
pub struct SledCompletionStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledCompletionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        let tree = db.open_tree("completed_tasks")?;
        debug!(records = tree.len(), "Opened completion store");
        Ok(Self { db, tree })
    }
}

#[async_trait]
impl CompletionStore for SledCompletionStore {
    async fn is_completed(&self, id: &TaskId) -> Result<bool> {
        Ok(self.tree.contains_key(id.as_str())?)
    }

    async fn mark_completed(&self, id: &TaskId) -> Result<()> {
        let record = CompletionRecord {
            task: id.as_str().to_string(),
            marked_at: Utc::now(),
        };
        let value = bincode::serialize(&record)?;

        // Insert-if-absent keeps the original marked_at on repeat marks
        let outcome = self
            .tree
            .compare_and_swap(id.as_str(), None as Option<&[u8]>, Some(value))?;
        match outcome {
            Ok(()) => {
                self.tree.flush_async().await?;
                debug!(task = %id, "Marked task completed");
            }
            Err(_) => {
                debug!(task = %id, "Task already marked completed");
            }
        }
        Ok(())
    }

    async fn completed_count(&self) -> Result<u64> {
        Ok(self.tree.len() as u64)
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

/// In-memory completion store for dry runs and tests
#[derive(Default)]
pub struct MemoryCompletionStore {
    records: DashMap<String, CompletionRecord>,
}

impl MemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompletionStore for MemoryCompletionStore {
    async fn is_completed(&self, id: &TaskId) -> Result<bool> {
        Ok(self.records.contains_key(id.as_str()))
    }

    async fn mark_completed(&self, id: &TaskId) -> Result<()> {
        self.records
            .entry(id.as_str().to_string())
            .or_insert_with(|| CompletionRecord {
                task: id.as_str().to_string(),
                marked_at: Utc::now(),
            });
        Ok(())
    }

    async fn completed_count(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
