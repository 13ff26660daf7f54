use std::fmt;
use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;
use crate::job::JobInput;

/// Result body produced by a successful analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    /// Structured result; the summary text lives under `"raw"`
    Structured(serde_json::Value),
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

/// Where in the per-item pipeline a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PathResolution,
    Analysis,
    Panicked,
    /// The spawned job could not be joined
    Dispatch,
    MalformedPayload,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::PathResolution => "path resolution",
            FailureKind::Analysis => "analysis",
            FailureKind::Panicked => "analysis",
            FailureKind::Dispatch => "dispatch",
            FailureKind::MalformedPayload => "malformed payload",
        };
        f.write_str(s)
    }
}

/// A single video that could not be analyzed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind} failed for {display_name}: {reason}")]
pub struct ItemFailure {
    pub index: usize,
    pub display_name: String,
    pub path: PathBuf,
    pub kind: FailureKind,
    pub reason: String,
}

impl ItemFailure {
    pub fn for_job(job: &JobInput, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            index: job.index,
            display_name: job.display_name.clone(),
            path: job.video_path.clone(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Settled result of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { payload: Payload },
    Failure { failure: ItemFailure },
}

impl Outcome {
    pub fn success(payload: impl Into<Payload>) -> Self {
        Outcome::Success {
            payload: payload.into(),
        }
    }

    pub fn failure(failure: ItemFailure) -> Self {
        Outcome::Failure { failure }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn as_failure(&self) -> Option<&ItemFailure> {
        match self {
            Outcome::Failure { failure } => Some(failure),
            Outcome::Success { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_carries_identity() {
        let failure = ItemFailure {
            index: 1,
            display_name: "b.mov".to_string(),
            path: PathBuf::from("/videos/b.mov"),
            kind: FailureKind::Analysis,
            reason: "quota exceeded".to_string(),
        };
        assert_eq!(failure.to_string(), "analysis failed for b.mov: quota exceeded");

        let outcome = Outcome::failure(failure.clone());
        assert!(!outcome.is_success());
        assert_eq!(outcome.as_failure(), Some(&failure));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::success("summary-a.mp4")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["payload"]["type"], "text");
        assert_eq!(json["payload"]["value"], "summary-a.mp4");
    }
}
