use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How the controller schedules per-video jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One job at a time, paced by `pacing_interval_ms`
    Sequential,
    /// Up to `max_concurrency` jobs in flight
    #[default]
    Parallel,
}

/// An external program used as an analysis, lookup or aggregation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute (looked up on PATH if not absolute)
    pub program: PathBuf,
    /// Arguments; `{placeholder}` tokens are substituted per invocation
    #[serde(default)]
    pub args: Vec<String>,
    /// Kill the program if it runs longer than this
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs: None,
        }
    }
}

/// Settings for publishing the finished thread as a Typefully draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Let the service split long content into a thread
    pub threadify: bool,
    /// Request a shareable link for the draft
    pub share: bool,
    pub request_timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.typefully.com/v1".to_string(),
            api_key_env: "TYPEFULLY_API_KEY".to_string(),
            threadify: true,
            share: false,
            request_timeout_secs: 30,
        }
    }
}

/// Configuration for the batch reporter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Sequential or bounded-parallel job execution
    pub execution_mode: ExecutionMode,
    /// Maximum number of analysis jobs running at once in parallel mode
    pub max_concurrency: usize,
    /// Pause between jobs in sequential mode, in milliseconds
    pub pacing_interval_ms: u64,
    /// File extensions treated as videos (case-insensitive, without dot)
    pub video_extensions: Vec<String>,
    /// Directory receiving summaries, manifest and the final thread
    pub output_dir: PathBuf,
    /// Wall-clock limit for a whole batch; `None` disables it
    pub batch_timeout_secs: Option<u64>,
    /// Per-video analysis backend
    pub analyzer: CommandSpec,
    /// Whole-batch aggregation backend
    pub aggregator: CommandSpec,
    /// Optional per-video enrichment backend
    pub lookup: Option<CommandSpec>,
    pub publisher: PublisherConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ReporterConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            execution_mode: ExecutionMode::Parallel,
            max_concurrency: 2,
            pacing_interval_ms: 2000,
            video_extensions: ["mp4", "mov", "avi", "mkv", "webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir: PathBuf::from("output"),
            batch_timeout_secs: Some(300),
            analyzer: CommandSpec::new("hackreporter-analyze", &["{video}"]),
            aggregator: CommandSpec::new("hackreporter-compose", &["{summaries_file}", "{count}"]),
            lookup: None,
            publisher: PublisherConfig::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                log::warn!("Config file {} not found, using defaults", config_path.display());
            }
        }

        Ok(config)
    }

    /// Admission limit for parallel mode; zero is treated as one
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }
}
