use std::io;
use thiserror::Error;

/// Coordinator errors. Task-scoped submission failures are not represented
/// here; they flow through `SubmitOutcome` and the retry state machine.
#[derive(Error, Debug)]
pub enum CoordError {
    // Store errors - fatal for the run
    #[error("Completion store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Record encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Configuration errors - fatal, surfaced before any worker starts
    #[error("Configuration invalid: {0}")]
    InvalidConfiguration(String),

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    // Worker-scoped: the affected worker exits, the run continues
    #[error("Worker {worker} could not open its session: {reason}")]
    SessionOpen { worker: usize, reason: String },

    #[error("Worker {worker} panicked or was cancelled")]
    WorkerJoin { worker: usize },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoordError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether this error aborts the whole run, as opposed to a single worker.
    pub fn is_run_fatal(&self) -> bool {
        match self {
            Self::Store(_)
            | Self::Encode(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::InvalidConfiguration(_)
            | Self::MissingConfiguration { .. } => true,
            Self::SessionOpen { .. } | Self::WorkerJoin { .. } => false,
            Self::Internal(_) => true,
            Self::Other(_) => true,
        }
    }
}

/// Result type alias for CoordError
pub type Result<T> = std::result::Result<T, CoordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_classification() {
        let session = CoordError::SessionOpen {
            worker: 2,
            reason: "driver refused".to_string(),
        };
        assert!(!session.is_run_fatal());

        let config = CoordError::invalid_configuration("workers must be > 0");
        assert!(config.is_run_fatal());

        let missing = CoordError::MissingConfiguration {
            field: "source_dir".to_string(),
        };
        assert!(missing.is_run_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = CoordError::SessionOpen {
            worker: 1,
            reason: "timeout".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("Worker 1"));
        assert!(display.contains("timeout"));
    }
}
