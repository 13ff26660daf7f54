use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Batch-level failures. Any of these aborts the batch and is turned into an
/// error report by the coordinator.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Directory '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("No video files found in {}", .0.display())]
    EmptyBatch(PathBuf),

    #[error("Failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    #[error("Batch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("run_batch_blocking called from inside an async runtime, use run_batch")]
    NestedRuntime,

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl BatchError {
    /// True for the "nothing to do" family: missing directory, not a
    /// directory, or no matching files.
    pub fn is_discovery_error(&self) -> bool {
        matches!(
            self,
            BatchError::NotFound(_) | BatchError::NotADirectory(_) | BatchError::EmptyBatch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_directory() {
        let err = BatchError::EmptyBatch(PathBuf::from("/videos"));
        assert_eq!(err.to_string(), "No video files found in /videos");

        let err = BatchError::NotFound(PathBuf::from("/missing"));
        assert_eq!(err.to_string(), "Directory '/missing' does not exist");
        assert!(err.is_discovery_error());

        let err = BatchError::Aggregation("model quota exceeded".to_string());
        assert!(!err.is_discovery_error());
        assert!(err.to_string().contains("model quota exceeded"));
    }

    #[test]
    fn test_timeout_message_in_seconds() {
        let err = BatchError::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "Batch timed out after 300s");
    }
}
