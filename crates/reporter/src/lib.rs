pub mod aggregate;
pub mod analysis;
pub mod artifacts;
pub mod command;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod job;
pub mod normalize;
pub mod outcome;
pub mod publish;
pub mod report;
pub mod scan;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregationRequest, Aggregator};
pub use analysis::{EntityLookup, LookupQuery, VideoAnalyzer};
pub use config::{CommandSpec, ExecutionMode, PublisherConfig, ReporterConfig};
pub use coordinator::{BatchCoordinator, BatchRequest};
pub use error::BatchError;
pub use events::{BatchEventSink, LogEventSink};
pub use job::JobInput;
pub use outcome::{FailureKind, ItemFailure, Outcome, Payload};
pub use report::{BatchReport, CompletedBatch, ItemReport, ItemStatus};
