//! Per-video analysis stage.
//!
//! The runner wraps an external [`VideoAnalyzer`]. Errors and panics of a call
//! come back as an [`Outcome::Failure`] value and never reach the controller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, warn};
use serde_json::json;
use crate::job::JobInput;
use crate::outcome::{FailureKind, ItemFailure, Outcome, Payload};

/// Analyzes one video and returns its summary
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    async fn analyze(&self, job: &JobInput) -> Result<Payload>;
}

/// Context handed to an entity lookup backend
#[derive(Debug, Clone)]
pub struct LookupQuery {
    pub display_name: String,
    pub attendee_list: Option<PathBuf>,
    /// Analysis text the people/team names are taken from
    pub analysis: String,
}

/// Finds social profiles for the people or team behind a video
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn lookup(&self, query: &LookupQuery) -> Result<String>;
}

/// Best-effort text of a caught panic
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs jobs through the analysis backend, optionally enriching results
#[derive(Clone)]
pub struct AnalysisRunner {
    analyzer: Arc<dyn VideoAnalyzer>,
    lookup: Option<Arc<dyn EntityLookup>>,
}

impl AnalysisRunner {
    pub fn new(analyzer: Arc<dyn VideoAnalyzer>) -> Self {
        Self {
            analyzer,
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn EntityLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Analyze one job. Never fails: faults are returned as `Outcome::Failure`.
    pub async fn run(&self, job: JobInput) -> Outcome {
        if let Some(reason) = &job.resolution_error {
            warn!("Job {} ({}): skipping analysis, {}", job.number(), job.display_name, reason);
            return Outcome::failure(ItemFailure::for_job(&job, FailureKind::PathResolution, reason.clone()));
        }

        debug!("Job {}: analyzing {}", job.number(), job.video_path.display());

        let result = AssertUnwindSafe(self.analyzer.analyze(&job)).catch_unwind().await;
        let payload = match result {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                warn!("Job {} ({}) failed: {:#}", job.number(), job.display_name, e);
                return Outcome::failure(ItemFailure::for_job(&job, FailureKind::Analysis, format!("{:#}", e)));
            }
            Err(panic) => {
                let reason = panic_message(panic);
                warn!("Job {} ({}) panicked: {}", job.number(), job.display_name, reason);
                return Outcome::failure(ItemFailure::for_job(&job, FailureKind::Panicked, format!("panicked: {}", reason)));
            }
        };

        match &self.lookup {
            Some(lookup) => Outcome::success(self.enrich(lookup.as_ref(), &job, payload).await),
            None => Outcome::success(payload),
        }
    }

    /// Attach lookup results to a successful text payload; lookup faults are
    /// logged and the payload is kept as-is
    async fn enrich(&self, lookup: &dyn EntityLookup, job: &JobInput, payload: Payload) -> Payload {
        let analysis = match &payload {
            Payload::Text(text) => text.clone(),
            Payload::Structured(_) => return payload,
        };

        let query = LookupQuery {
            display_name: job.display_name.clone(),
            attendee_list: job.attendee_list.clone(),
            analysis: analysis.clone(),
        };

        match AssertUnwindSafe(lookup.lookup(&query)).catch_unwind().await {
            Ok(Ok(entities)) => Payload::Structured(json!({
                "raw": analysis,
                "entities": entities,
            })),
            Ok(Err(e)) => {
                warn!("Job {} ({}): entity lookup failed: {:#}", job.number(), job.display_name, e);
                payload
            }
            Err(panic) => {
                warn!("Job {} ({}): entity lookup panicked: {}", job.number(), job.display_name, panic_message(panic));
                payload
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VideoAnalyzer for EchoAnalyzer {
        async fn analyze(&self, job: &JobInput) -> Result<Payload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match job.display_name.as_str() {
                "bad.mp4" => anyhow::bail!("remote API returned 503"),
                "boom.mp4" => panic!("decoder exploded"),
                name => Ok(Payload::Text(format!("summary-{}", name))),
            }
        }
    }

    struct FixedLookup(Option<&'static str>);

    #[async_trait]
    impl EntityLookup for FixedLookup {
        async fn lookup(&self, _query: &LookupQuery) -> Result<String> {
            match self.0 {
                Some(text) => Ok(text.to_string()),
                None => anyhow::bail!("search quota exhausted"),
            }
        }
    }

    fn job(index: usize, name: &str) -> JobInput {
        JobInput {
            index,
            video_path: PathBuf::from(format!("/videos/{}", name)),
            display_name: name.to_string(),
            source_dir: PathBuf::from("/videos"),
            attendee_list: None,
            gallery_url: None,
            resolution_error: None,
        }
    }

    fn runner() -> (AnalysisRunner, Arc<EchoAnalyzer>) {
        let analyzer = Arc::new(EchoAnalyzer {
            calls: AtomicUsize::new(0),
        });
        (AnalysisRunner::new(analyzer.clone()), analyzer)
    }

    #[tokio::test]
    async fn test_success_wraps_payload() {
        let (runner, _) = runner();
        let outcome = runner.run(job(0, "a.mp4")).await;
        assert_eq!(outcome, Outcome::success("summary-a.mp4"));
    }

    #[tokio::test]
    async fn test_error_becomes_failure() {
        let (runner, _) = runner();
        let outcome = runner.run(job(1, "bad.mp4")).await;
        let failure = outcome.as_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Analysis);
        assert_eq!(failure.index, 1);
        assert!(failure.reason.contains("503"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (runner, _) = runner();
        let outcome = runner.run(job(2, "boom.mp4")).await;
        let failure = outcome.as_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Panicked);
        assert_eq!(failure.reason, "panicked: decoder exploded");
        assert_eq!(failure.to_string(), "analysis failed for boom.mp4: panicked: decoder exploded");
    }

    #[tokio::test]
    async fn test_unresolved_path_skips_analyzer() {
        let (runner, analyzer) = runner();
        let mut j = job(0, "gone.mp4");
        j.resolution_error = Some("cannot resolve /videos/gone.mp4".to_string());

        let outcome = runner.run(j).await;
        assert_eq!(outcome.as_failure().unwrap().kind, FailureKind::PathResolution);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_enriches_success() {
        let (runner, _) = runner();
        let runner = runner.with_lookup(Arc::new(FixedLookup(Some("@team_a"))));

        match runner.run(job(0, "a.mp4")).await {
            Outcome::Success {
                payload: Payload::Structured(v),
            } => {
                assert_eq!(v["raw"], "summary-a.mp4");
                assert_eq!(v["entities"], "@team_a");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_analysis() {
        let (runner, _) = runner();
        let runner = runner.with_lookup(Arc::new(FixedLookup(None)));

        let outcome = runner.run(job(0, "a.mp4")).await;
        assert_eq!(outcome, Outcome::success("summary-a.mp4"));
    }
}
