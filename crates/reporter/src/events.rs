use std::path::Path;
use log::{error, info, warn};
use crate::outcome::ItemFailure;
use crate::report::BatchReport;

/// Observer for batch lifecycle events (tracing, dashboards, notifications).
///
/// All methods default to no-ops so sinks only implement what they need.
pub trait BatchEventSink: Send + Sync {
    fn batch_started(&self, _source_dir: &Path, _item_count: usize) {}

    fn item_failed(&self, _failure: &ItemFailure) {}

    fn batch_finished(&self, _report: &BatchReport) {}
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl BatchEventSink for LogEventSink {
    fn batch_started(&self, source_dir: &Path, item_count: usize) {
        info!("Batch started: {} video(s) in {}", item_count, source_dir.display());
    }

    fn item_failed(&self, failure: &ItemFailure) {
        warn!("Video {} ({}): {}", failure.index + 1, failure.path.display(), failure);
    }

    fn batch_finished(&self, report: &BatchReport) {
        match report {
            BatchReport::Completed(batch) => info!(
                "Batch {} finished: {} processed, {} failed",
                batch.batch_id, batch.processed_count, batch.failed_count
            ),
            BatchReport::Failed { error: reason } => error!("Batch failed: {}", reason),
        }
    }
}
