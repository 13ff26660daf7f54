//! Scripted backends shared by the unit tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use crate::aggregate::{AggregationRequest, Aggregator};
use crate::analysis::VideoAnalyzer;
use crate::controller::AdmissionGate;
use crate::job::JobInput;
use crate::outcome::Payload;

/// Analyzer returning `summary-<name>`, with per-index delays and faults
#[derive(Default)]
pub struct ScriptedAnalyzer {
    delays_ms: Vec<u64>,
    failing: HashSet<usize>,
    panicking: HashSet<usize>,
    close_gate: Option<(usize, AdmissionGate)>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    started: Mutex<Vec<usize>>,
    finished: Mutex<Vec<usize>>,
}

impl ScriptedAnalyzer {
    pub fn with_delays_ms(mut self, delays: &[u64]) -> Self {
        self.delays_ms = delays.to_vec();
        self
    }

    pub fn failing(mut self, indices: &[usize]) -> Self {
        self.failing.extend(indices);
        self
    }

    pub fn panicking(mut self, indices: &[usize]) -> Self {
        self.panicking.extend(indices);
        self
    }

    pub fn closing_gate_on(mut self, index: usize, gate: AdmissionGate) -> Self {
        self.close_gate = Some((index, gate));
        self
    }

    pub fn start_order(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub fn finish_order(&self) -> Vec<usize> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, job: &JobInput) -> Result<Payload> {
        self.started.lock().unwrap().push(job.index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some((index, gate)) = &self.close_gate {
            if *index == job.index {
                gate.close();
            }
        }

        let delay = self.delays_ms.get(job.index).copied().unwrap_or(0);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(job.index);

        if self.panicking.contains(&job.index) {
            panic!("scripted panic for {}", job.display_name);
        }
        if self.failing.contains(&job.index) {
            anyhow::bail!("scripted failure for {}", job.display_name);
        }
        Ok(Payload::Text(format!("summary-{}", job.display_name)))
    }
}

/// Aggregator recording every request it receives
#[derive(Default)]
pub struct RecordingAggregator {
    pub fail: bool,
    pub requests: Mutex<Vec<AggregationRequest>>,
}

impl RecordingAggregator {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Aggregator for RecordingAggregator {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("composer unavailable");
        }
        Ok(format!("# Thread\n\n{} projects ranked", request.video_count))
    }
}

/// Jobs with resolved paths under /videos, one per name
pub fn jobs_named(names: &[String]) -> Vec<JobInput> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| JobInput {
            index,
            video_path: PathBuf::from("/videos").join(name),
            display_name: name.clone(),
            source_dir: PathBuf::from("/videos"),
            attendee_list: None,
            gallery_url: None,
            resolution_error: None,
        })
        .collect()
}
