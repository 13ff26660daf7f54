//! Publishing of the composed thread as a Typefully draft.
//!
//! Not part of the batch flow: the CLI calls this after a thread has been
//! written and reviewed.
//!
//! # API Reference
//! - Endpoint: `POST {base_url}/drafts/`
//! - Auth header: `X-API-KEY: Bearer <key>`

use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::config::PublisherConfig;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0} environment variable is required")]
    MissingApiKey(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to Typefully failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Typefully API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse Typefully response: {0}")]
    Parse(String),

    #[error("Nothing to publish: content is empty")]
    EmptyContent,
}

/// Options for one draft
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// ISO-8601 date to schedule the thread for
    pub schedule_date: Option<String>,
    /// Overrides the configured share flag
    pub share: Option<bool>,
}

/// What the publishing backend returns for a created draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftReference {
    pub draft_id: String,
    pub share_url: Option<String>,
    pub scheduled_at: Option<String>,
    pub status: String,
}

/// Publishes finished text somewhere and returns a reference to it
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, content: &str, options: &PublishOptions) -> Result<DraftReference, PublishError>;
}

#[derive(Debug, Serialize)]
struct DraftRequest<'a> {
    content: &'a str,
    threadify: bool,
    share: bool,
    #[serde(rename = "schedule-date", skip_serializing_if = "Option::is_none")]
    schedule_date: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    id: serde_json::Value,
    share_url: Option<String>,
    scheduled_at: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    detail: Option<String>,
}

/// Typefully drafts client
pub struct TypefullyPublisher {
    http_client: Client,
    api_key: String,
    config: PublisherConfig,
}

impl TypefullyPublisher {
    pub fn new(config: PublisherConfig, api_key: String) -> Result<Self, PublishError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(PublishError::Client)?;
        Ok(Self {
            http_client,
            api_key,
            config,
        })
    }

    /// Read the API key from the environment variable named in the config
    pub fn from_env(config: PublisherConfig) -> Result<Self, PublishError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PublishError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    fn drafts_url(&self) -> String {
        format!("{}/drafts/", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&self, content: &'a str, options: &'a PublishOptions) -> DraftRequest<'a> {
        DraftRequest {
            content,
            threadify: self.config.threadify,
            share: options.share.unwrap_or(self.config.share),
            schedule_date: options.schedule_date.as_deref(),
        }
    }
}

fn parse_draft(body: &str) -> Result<DraftReference, PublishError> {
    let data: DraftResponse = serde_json::from_str(body).map_err(|e| PublishError::Parse(e.to_string()))?;
    let draft_id = match data.id {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(PublishError::Parse(format!("unexpected draft id: {}", other))),
    };
    Ok(DraftReference {
        draft_id,
        share_url: data.share_url,
        scheduled_at: data.scheduled_at,
        status: data.status.unwrap_or_else(|| "draft".to_string()),
    })
}

fn parse_error(status: u16, body: &str) -> PublishError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.message.or(e.detail))
        .unwrap_or_else(|| body.trim().to_string());
    PublishError::Api { status, message }
}

#[async_trait]
impl Publisher for TypefullyPublisher {
    async fn publish(&self, content: &str, options: &PublishOptions) -> Result<DraftReference, PublishError> {
        if content.trim().is_empty() {
            return Err(PublishError::EmptyContent);
        }

        let payload = self.build_request(content, options);
        debug!("Creating Typefully draft ({} chars)", content.len());

        let response = self
            .http_client
            .post(self.drafts_url())
            .header("X-API-KEY", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(PublishError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(PublishError::Network)?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        let draft = parse_draft(&body)?;
        info!("Typefully draft created: {}", draft.draft_id);
        Ok(draft)
    }
}
