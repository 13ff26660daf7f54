//! Whole-batch aggregation stage.
//!
//! Runs the aggregation backend exactly once over every summary and stores
//! the composed thread. Unlike per-video failures, a failed aggregation is
//! fatal for the batch.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use log::{error, info};
use serde::Serialize;
use crate::analysis::panic_message;
use crate::artifacts::{ArtifactWriter, Manifest};
use crate::error::BatchError;

/// Separator placed between summaries in `all_summaries`
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// Input of the aggregation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationRequest {
    /// Every summary in discovery order, joined by [`SUMMARY_SEPARATOR`]
    pub all_summaries: String,
    pub video_count: usize,
    /// The manifest written by the artifact writer
    pub summaries_file: PathBuf,
    pub source_dir: PathBuf,
}

impl AggregationRequest {
    pub fn from_manifest(manifest: &Manifest, summaries_file: &Path) -> Self {
        Self {
            all_summaries: manifest.summaries.join(SUMMARY_SEPARATOR),
            video_count: manifest.item_count,
            summaries_file: summaries_file.to_path_buf(),
            source_dir: manifest.source_dir.clone(),
        }
    }
}

/// Composes the final ranked thread from all summaries
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<String>;
}

/// The stored result of aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalArtifact {
    pub path: PathBuf,
    pub content: String,
}

pub struct AggregationRunner {
    aggregator: Arc<dyn Aggregator>,
    writer: ArtifactWriter,
}

impl AggregationRunner {
    pub fn new(aggregator: Arc<dyn Aggregator>, writer: ArtifactWriter) -> Self {
        Self { aggregator, writer }
    }

    /// Aggregate once and write the thread file
    pub async fn run(&self, manifest: &Manifest, summaries_file: &Path) -> Result<FinalArtifact, BatchError> {
        let request = AggregationRequest::from_manifest(manifest, summaries_file);
        info!("Aggregating {} summaries into the final thread", request.video_count);

        let content = match AssertUnwindSafe(self.aggregator.aggregate(&request)).catch_unwind().await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                error!("Aggregation failed: {:#}", e);
                return Err(BatchError::Aggregation(format!("{:#}", e)));
            }
            Err(panic) => {
                let reason = panic_message(panic);
                error!("Aggregation panicked: {}", reason);
                return Err(BatchError::Aggregation(reason));
            }
        };

        let path = self.writer.write_thread(&content)?;
        Ok(FinalArtifact { path, content })
    }
}
