use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Index of a worker within the pool, in `[0, workers)`.
pub type WorkerId = usize;

/// Normalized identifier of a task: the absolute path of the source artifact,
/// case-folded so that two spellings of the same file compare equal.
///
/// Normalization is applied identically on completion-store reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Normalize a filesystem path into a task identifier.
    pub fn normalize(path: &Path) -> Self {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|d| d.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        TaskId(absolute.to_string_lossy().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task status over its lifetime within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Submitted,
    Failed,
}

/// One unit of work: a single packaged artifact to submit.
///
/// Owned by whichever worker currently holds it; immutable once `Submitted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub title: String,
    pub tagline: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Build a task from its source artifact. The title is derived from the
    /// file stem, with underscores mapped to spaces.
    pub fn new(path: PathBuf, size_bytes: u64, tagline: String, description: String) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace('_', " "))
            .unwrap_or_default();
        Self {
            id: TaskId::normalize(&path),
            path,
            size_bytes,
            title,
            tagline,
            description,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Dead time to wait after the artifact transfer begins, before assuming
    /// the upload has settled: `base + size_mb * per_mb` seconds. A heuristic,
    /// not a completion signal.
    pub fn settle_wait(&self, base: Duration, per_mb_secs: f64) -> Duration {
        base + Duration::from_secs_f64((self.size_mb() * per_mb_secs).max(0.0))
    }
}
