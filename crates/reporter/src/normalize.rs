use serde_json::Value;
use crate::job::JobInput;
use crate::outcome::{FailureKind, Outcome, Payload};

/// Field of a structured payload holding the summary text
pub const RAW_TEXT_FIELD: &str = "raw";
/// Field holding people/team lookup results, appended to the summary
pub const ENTITIES_FIELD: &str = "entities";

/// Summary text for one item plus why it is a placeholder, if it is one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub summary: String,
    pub failure: Option<String>,
}

impl NormalizedItem {
    pub fn is_placeholder(&self) -> bool {
        self.failure.is_some()
    }
}

/// Text standing in for an item whose analysis produced nothing usable
pub fn placeholder(display_name: &str, reason: &str) -> String {
    format!("[{}] summary unavailable: {}", display_name, reason)
}

fn extract_text(payload: &Payload) -> Result<String, String> {
    match payload {
        Payload::Text(text) => Ok(text.clone()),
        Payload::Structured(Value::Null) => Err("analysis returned no content".to_string()),
        Payload::Structured(Value::String(text)) => Ok(text.clone()),
        Payload::Structured(value) => match value.get(RAW_TEXT_FIELD) {
            Some(Value::String(text)) => Ok(with_entities(text, value.get(ENTITIES_FIELD))),
            Some(other) => Err(format!("'{}' field is not text: {}", RAW_TEXT_FIELD, other)),
            None => Ok(value.to_string()),
        },
    }
}

/// Append a `People:` section when the lookup found anything
fn with_entities(text: &str, entities: Option<&Value>) -> String {
    let entities = match entities {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    if entities.is_empty() {
        text.to_string()
    } else {
        format!("{}\n\nPeople:\n{}", text, entities)
    }
}

/// Turn one outcome into its summary
pub fn normalize_outcome(display_name: &str, outcome: &Outcome) -> NormalizedItem {
    match outcome {
        Outcome::Success { payload } => match extract_text(payload) {
            Ok(summary) => NormalizedItem {
                summary,
                failure: None,
            },
            Err(reason) => {
                let reason = format!("{}: {}", FailureKind::MalformedPayload, reason);
                log::warn!("{}: {}", display_name, reason);
                NormalizedItem {
                    summary: placeholder(display_name, &reason),
                    failure: Some(reason),
                }
            }
        },
        Outcome::Failure { failure } => {
            let reason = format!("{} failed: {}", failure.kind, failure.reason);
            NormalizedItem {
                summary: placeholder(display_name, &reason),
                failure: Some(reason),
            }
        }
    }
}

/// Normalize every outcome; the result always has one entry per job.
///
/// `outcomes` is expected to be aligned with `jobs`; a missing outcome is
/// reported as a placeholder rather than dropped.
pub fn normalize(jobs: &[JobInput], outcomes: &[Outcome]) -> Vec<NormalizedItem> {
    jobs.iter()
        .enumerate()
        .map(|(i, job)| match outcomes.get(i) {
            Some(outcome) => normalize_outcome(&job.display_name, outcome),
            None => {
                let reason = "no outcome recorded".to_string();
                NormalizedItem {
                    summary: placeholder(&job.display_name, &reason),
                    failure: Some(reason),
                }
            }
        })
        .collect()
}
