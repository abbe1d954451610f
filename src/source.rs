use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Task, TaskId};
use crate::store::CompletionStore;

/// External collaborator that derives a (tagline, description) pair from a
/// packaged artifact's contents. Reading inside the archive is not the
/// coordinator's job.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> (String, String);
}

/// Fallback extractor that supplies no archive-derived text; the task title
/// still comes from the file name.
pub struct NoMetadata;

#[async_trait]
impl MetadataExtractor for NoMetadata {
    async fn extract(&self, _path: &Path) -> (String, String) {
        (String::new(), String::new())
    }
}

/// Enumerates candidate tasks from a directory, filtered through the
/// completion store.
///
/// The snapshot is taken once at run start; artifacts added afterwards are
/// not picked up until the next run. Order is lexicographic by path, stable
/// within a run.
pub struct TaskSource {
    dir: PathBuf,
    store: Arc<dyn CompletionStore>,
    metadata: Arc<dyn MetadataExtractor>,
}

impl TaskSource {
    pub fn new(
        dir: impl Into<PathBuf>,
        store: Arc<dyn CompletionStore>,
        metadata: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            dir: dir.into(),
            store,
            metadata,
        }
    }

    /// Capture the finite, non-restartable task sequence for this run
    pub async fn snapshot(&self) -> Result<Vec<Task>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("zip"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let candidates = paths.len();
        let mut tasks = Vec::new();
        for path in paths {
            let id = TaskId::normalize(&path);
            if self.store.is_completed(&id).await? {
                debug!(task = %id, "Skipping already-completed task");
                continue;
            }
            let size_bytes = std::fs::metadata(&path)?.len();
            let (tagline, description) = self.metadata.extract(&path).await;
            tasks.push(Task::new(path, size_bytes, tagline, description));
        }

        info!(
            candidates,
            pending = tasks.len(),
            dir = %self.dir.display(),
            "Task snapshot captured"
        );
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCompletionStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"payload").unwrap();
        path
    }

    #[tokio::test]
    async fn test_snapshot_filters_completed() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.zip");
        touch(dir.path(), "b.zip");
        touch(dir.path(), "c.zip");

        let store = Arc::new(MemoryCompletionStore::new());
        store
            .mark_completed(&TaskId::normalize(&a))
            .await
            .unwrap();

        let source = TaskSource::new(dir.path(), store, Arc::new(NoMetadata));
        let tasks = source.snapshot().await.unwrap();

        let names: Vec<_> = tasks
            .iter()
            .map(|t| t.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["b.zip", "c.zip"]);
    }

    #[tokio::test]
    async fn test_snapshot_ignores_other_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.zip");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "B.ZIP");

        let store = Arc::new(MemoryCompletionStore::new());
        let source = TaskSource::new(dir.path(), store, Arc::new(NoMetadata));
        let tasks = source.snapshot().await.unwrap();

        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_order_is_stable() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "c.zip");
        touch(dir.path(), "a.zip");
        touch(dir.path(), "b.zip");

        let store = Arc::new(MemoryCompletionStore::new());
        let source = TaskSource::new(dir.path(), store, Arc::new(NoMetadata));

        let first = source.snapshot().await.unwrap();
        let second = source.snapshot().await.unwrap();
        let order = |tasks: &[Task]| {
            tasks
                .iter()
                .map(|t| t.path.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
        assert!(order(&first).windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_snapshot_records_size() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.zip");

        let store = Arc::new(MemoryCompletionStore::new());
        let source = TaskSource::new(dir.path(), store, Arc::new(NoMetadata));
        let tasks = source.snapshot().await.unwrap();

        assert_eq!(tasks[0].size_bytes, 7);
    }

    #[tokio::test]
    async fn test_missing_dir_is_an_error() {
        let store = Arc::new(MemoryCompletionStore::new());
        let source = TaskSource::new("/nonexistent/uploads", store, Arc::new(NoMetadata));
        assert!(source.snapshot().await.is_err());
    }
}
