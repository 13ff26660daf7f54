//! End-to-end batch flow.
//!
//! Discovery, job building, the controller, normalization, artifact writing
//! and aggregation run in that order. Batch-level errors come back as
//! [`BatchReport::Failed`]; item-level errors stay inside the report.

use std::path::PathBuf;
use std::sync::Arc;
use chrono::Utc;
use log::{error, info, warn};
use uuid::Uuid;
use crate::aggregate::{AggregationRunner, Aggregator};
use crate::analysis::{AnalysisRunner, EntityLookup, VideoAnalyzer};
use crate::artifacts::{ArtifactWriter, Manifest};
use crate::config::ReporterConfig;
use crate::controller::ConcurrencyController;
use crate::error::BatchError;
use crate::events::BatchEventSink;
use crate::job::{build_jobs, BatchContext};
use crate::normalize::normalize;
use crate::report::{BatchReport, CompletedBatch, ItemReport, ItemStatus};
use crate::scan::discover_items;

/// Arguments of one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub directory: PathBuf,
    pub attendee_list: Option<PathBuf>,
    pub gallery_url: Option<String>,
}

impl BatchRequest {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    pub fn attendee_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.attendee_list = Some(path.into());
        self
    }

    pub fn gallery_url(mut self, url: impl Into<String>) -> Self {
        self.gallery_url = Some(url.into());
        self
    }
}

pub struct BatchCoordinator {
    config: ReporterConfig,
    runner: AnalysisRunner,
    controller: ConcurrencyController,
    aggregator: Arc<dyn Aggregator>,
    events: Option<Arc<dyn BatchEventSink>>,
}

impl BatchCoordinator {
    pub fn new(config: ReporterConfig, analyzer: Arc<dyn VideoAnalyzer>, aggregator: Arc<dyn Aggregator>) -> Self {
        Self {
            controller: ConcurrencyController::from_config(&config),
            runner: AnalysisRunner::new(analyzer),
            config,
            aggregator,
            events: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn EntityLookup>) -> Self {
        self.runner = self.runner.with_lookup(lookup);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn BatchEventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Run a whole batch. Always returns a report, never an error.
    pub async fn run_batch(&self, request: BatchRequest) -> BatchReport {
        let result = match self.config.batch_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.execute(&request)).await {
                Ok(result) => result,
                Err(_) => Err(BatchError::Timeout(limit)),
            },
            None => self.execute(&request).await,
        };

        let report = match result {
            Ok(batch) => BatchReport::Completed(batch),
            Err(e) if e.is_discovery_error() => {
                warn!("Nothing to process in {}: {}", request.directory.display(), e);
                BatchReport::failed(e)
            }
            Err(e) => {
                error!("Batch for {} failed: {}", request.directory.display(), e);
                BatchReport::failed(e)
            }
        };

        if let Some(events) = &self.events {
            events.batch_finished(&report);
        }
        report
    }

    /// Blocking wrapper around [`run_batch`](Self::run_batch) for callers
    /// without a runtime. Called from inside a tokio runtime it returns a
    /// failed report instead of blocking that runtime.
    pub fn run_batch_blocking(&self, request: BatchRequest) -> BatchReport {
        if tokio::runtime::Handle::try_current().is_ok() {
            return BatchReport::failed(BatchError::NestedRuntime);
        }
        match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(rt) => rt.block_on(self.run_batch(request)),
            Err(e) => BatchReport::failed(BatchError::Runtime(e)),
        }
    }

    async fn execute(&self, request: &BatchRequest) -> Result<CompletedBatch, BatchError> {
        let started_at = Utc::now();
        let batch_id = Uuid::new_v4();

        let items = discover_items(&request.directory, &self.config.video_extensions)?;
        info!("Batch {}: found {} video(s) in {}", batch_id, items.len(), request.directory.display());
        if let Some(events) = &self.events {
            events.batch_started(&request.directory, items.len());
        }

        let attendee_list = match &request.attendee_list {
            Some(path) if !path.exists() => {
                warn!("Attendee list file '{}' not found, proceeding without it", path.display());
                None
            }
            other => other.clone(),
        };
        let ctx = BatchContext {
            source_dir: request.directory.clone(),
            attendee_list,
            gallery_url: request.gallery_url.clone(),
        };

        let jobs = build_jobs(&items, &ctx);
        let outcomes = self.controller.run_all(&self.runner, jobs.clone()).await;

        if let Some(events) = &self.events {
            for failure in outcomes.iter().filter_map(|o| o.as_failure()) {
                events.item_failed(failure);
            }
        }

        let normalized = normalize(&jobs, &outcomes);
        let manifest = Manifest::new(
            normalized.iter().map(|n| n.summary.clone()).collect(),
            request.directory.clone(),
        );

        let writer = ArtifactWriter::new(&self.config.output_dir);
        let written = writer.write(&manifest)?;

        let aggregation = AggregationRunner::new(self.aggregator.clone(), writer);
        let artifact = aggregation.run(&manifest, &written.manifest_path).await?;

        let item_reports: Vec<ItemReport> = items
            .iter()
            .zip(normalized)
            .zip(written.summary_paths)
            .enumerate()
            .map(|(i, ((item, norm), summary_path))| ItemReport {
                number: i + 1,
                display_name: item.display_name.clone(),
                path: item.path.clone(),
                summary_path,
                status: match norm.failure {
                    None => ItemStatus::Succeeded,
                    Some(reason) => ItemStatus::Failed { reason },
                },
            })
            .collect();

        let failed_count = item_reports.iter().filter(|r| !r.succeeded()).count();

        Ok(CompletedBatch {
            batch_id,
            source_dir: request.directory.clone(),
            processed_count: item_reports.len(),
            succeeded_count: item_reports.len() - failed_count,
            failed_count,
            item_paths: items.into_iter().map(|i| i.path).collect(),
            outcomes: item_reports,
            manifest_path: written.manifest_path,
            final_artifact_path: artifact.path,
            result: artifact.content,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
