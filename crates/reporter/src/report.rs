use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Per-item result as shown to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    /// 1-based position in discovery order
    pub number: usize,
    pub display_name: String,
    pub path: PathBuf,
    pub summary_path: PathBuf,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn succeeded(&self) -> bool {
        self.status == ItemStatus::Succeeded
    }
}

/// A batch that ran all the way through aggregation
#[derive(Debug, Clone, Serialize)]
pub struct CompletedBatch {
    pub batch_id: Uuid,
    pub source_dir: PathBuf,
    pub processed_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub item_paths: Vec<PathBuf>,
    pub outcomes: Vec<ItemReport>,
    pub manifest_path: PathBuf,
    pub final_artifact_path: PathBuf,
    /// Text of the final thread
    pub result: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CompletedBatch {
    /// Some items failed but the batch still produced a thread
    pub fn is_degraded(&self) -> bool {
        self.failed_count > 0
    }
}

/// What `run_batch` hands back: never a raw error or panic
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchReport {
    Failed { error: String },
    Completed(CompletedBatch),
}

impl BatchReport {
    pub fn failed(error: impl ToString) -> Self {
        BatchReport::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchReport::Completed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BatchReport::Failed { error } => Some(error),
            BatchReport::Completed(_) => None,
        }
    }

    pub fn completed(&self) -> Option<&CompletedBatch> {
        match self {
            BatchReport::Completed(batch) => Some(batch),
            BatchReport::Failed { .. } => None,
        }
    }
}
