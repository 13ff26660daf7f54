//! Runs analysis jobs sequentially or under a bounded admission gate.
//!
//! Every job moves `Pending -> Running -> Settled`. The returned outcomes are
//! indexed by discovery position, never by completion order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use crate::analysis::AnalysisRunner;
use crate::config::{ExecutionMode, ReporterConfig};
use crate::job::{JobInput, JobState};
use crate::outcome::{FailureKind, ItemFailure, Outcome};

/// Counting gate bounding how many jobs may be Running at once.
///
/// Clones share the same permits. Closing the gate stops parallel admission;
/// jobs not yet admitted are then run sequentially by the controller.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionGate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits not currently held by a running job
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn close(&self) {
        self.semaphore.close();
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }
}

/// Per-job bookkeeping owned by the coordinating task
struct Slot {
    state: JobState,
    input: Option<JobInput>,
    display_name: String,
    path: PathBuf,
}

impl Slot {
    fn new(job: JobInput) -> Self {
        Self {
            state: JobState::Pending,
            display_name: job.display_name.clone(),
            path: job.video_path.clone(),
            input: Some(job),
        }
    }

    fn failure(&self, index: usize, kind: FailureKind, reason: impl Into<String>) -> ItemFailure {
        ItemFailure {
            index,
            display_name: self.display_name.clone(),
            path: self.path.clone(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Schedules jobs through an [`AnalysisRunner`]
pub struct ConcurrencyController {
    mode: ExecutionMode,
    gate: AdmissionGate,
    pacing: Duration,
}

impl ConcurrencyController {
    pub fn new(mode: ExecutionMode, max_concurrency: usize, pacing: Duration) -> Self {
        Self {
            mode,
            gate: AdmissionGate::new(max_concurrency),
            pacing,
        }
    }

    pub fn from_config(cfg: &ReporterConfig) -> Self {
        Self::new(cfg.execution_mode, cfg.concurrency_limit(), cfg.pacing_interval())
    }

    /// Handle on the admission gate, e.g. to close it from outside
    pub fn gate(&self) -> AdmissionGate {
        self.gate.clone()
    }

    /// Run every job to completion and return outcomes in discovery order
    pub async fn run_all(&self, runner: &AnalysisRunner, jobs: Vec<JobInput>) -> Vec<Outcome> {
        let total = jobs.len();
        let mut slots: Vec<Slot> = jobs.into_iter().map(Slot::new).collect();
        let started = Instant::now();

        match self.mode {
            ExecutionMode::Sequential => {
                info!("Running {} job(s) sequentially ({}ms pacing)", total, self.pacing.as_millis());
                let order: Vec<usize> = (0..total).collect();
                self.run_sequential(runner, &mut slots, &order).await;
            }
            ExecutionMode::Parallel => {
                info!("Running {} job(s) with up to {} in flight", total, self.gate.limit());
                self.run_parallel(runner, &mut slots).await;

                let undispatched: Vec<usize> = slots
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.state == JobState::Pending)
                    .map(|(i, _)| i)
                    .collect();
                if !undispatched.is_empty() {
                    warn!("Falling back to sequential execution for {} undispatched job(s)", undispatched.len());
                    self.run_sequential(runner, &mut slots, &undispatched).await;
                }
            }
        }

        let outcomes: Vec<Outcome> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot.state {
                JobState::Settled(outcome) => outcome,
                JobState::Pending | JobState::Running => {
                    Outcome::failure(slot.failure(index, FailureKind::Dispatch, "job never settled"))
                }
            })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            "All {} job(s) settled in {:.1}s: {} succeeded, {} failed",
            total,
            started.elapsed().as_secs_f64(),
            total - failed,
            failed
        );
        outcomes
    }

    async fn run_sequential(&self, runner: &AnalysisRunner, slots: &mut [Slot], order: &[usize]) {
        for (position, &index) in order.iter().enumerate() {
            if position > 0 && !self.pacing.is_zero() {
                debug!("Pacing {}ms before next job", self.pacing.as_millis());
                tokio::time::sleep(self.pacing).await;
            }

            let Some(job) = slots[index].input.take() else {
                continue;
            };
            slots[index].state = JobState::Running;
            debug!("Job {} running: {}", index + 1, slots[index].display_name);

            let outcome = runner.run(job).await;
            settle(slots, index, outcome);
        }
    }

    async fn run_parallel(&self, runner: &AnalysisRunner, slots: &mut [Slot]) {
        let total = slots.len();
        let mut next = 0;
        let mut admission_open = true;
        let mut in_flight = FuturesUnordered::new();

        while (admission_open && next < total) || !in_flight.is_empty() {
            tokio::select! {
                permit = self.gate.admit(), if admission_open && next < total => {
                    match permit {
                        Ok(permit) => {
                            let index = next;
                            next += 1;
                            let Some(job) = slots[index].input.take() else {
                                continue;
                            };
                            slots[index].state = JobState::Running;
                            debug!(
                                "Job {} running: {} ({} of {} permits in use)",
                                index + 1,
                                slots[index].display_name,
                                self.gate.limit() - self.gate.available(),
                                self.gate.limit()
                            );

                            let runner = runner.clone();
                            let handle = tokio::spawn(async move {
                                // Dropped on every exit path, including unwinding
                                let _permit = permit;
                                runner.run(job).await
                            });
                            in_flight.push(handle.map(move |joined| (index, joined)));
                        }
                        Err(_) => {
                            warn!(
                                "Admission gate closed with {} job(s) not yet dispatched",
                                total - next
                            );
                            admission_open = false;
                        }
                    }
                }
                Some((index, joined)) = in_flight.next(), if !in_flight.is_empty() => {
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!("Job {} could not be joined: {}", index + 1, e);
                            Outcome::failure(slots[index].failure(index, FailureKind::Dispatch, e.to_string()))
                        }
                    };
                    settle(slots, index, outcome);
                }
                else => break,
            }
        }
    }
}

fn settle(slots: &mut [Slot], index: usize, outcome: Outcome) {
    match &outcome {
        Outcome::Success { .. } => debug!("Job {} settled: success", index + 1),
        Outcome::Failure { failure } => debug!("Job {} settled: {}", index + 1, failure),
    }
    slots[index].state = JobState::Settled(outcome);
}
