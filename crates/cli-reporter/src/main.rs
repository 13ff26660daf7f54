use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use humansize::{format_size, BINARY};
use log::{debug, info, LevelFilter};
use reporter::{
    command::{CommandAggregator, CommandAnalyzer, CommandLookup},
    publish::{PublishOptions, Publisher, TypefullyPublisher},
    scan::discover_items,
    BatchCoordinator, BatchReport, BatchRequest, ExecutionMode, LogEventSink, ReporterConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lines of the composed thread shown after a successful run
const PREVIEW_LINES: usize = 10;

/// Turn a folder of hackathon demo videos into per-project summaries and a
/// ranked social media thread
#[derive(Parser, Debug)]
#[command(name = "hackreporter", author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze every video in a directory and compose the thread
    Run(RunArgs),
    /// List the videos a run would process
    List {
        /// Directory containing the demo videos
        dir: PathBuf,

        /// Path to configuration file (JSON or TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Publish a composed thread as a Typefully draft
    Publish {
        /// Thread file, usually output/tweet_thread.md
        file: PathBuf,

        /// Path to configuration file (JSON or TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Schedule date (RFC 3339) instead of leaving it as a draft
        #[arg(long, value_parser = parse_schedule)]
        schedule: Option<String>,

        /// Request a shareable link for the draft
        #[arg(long)]
        share: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory containing the demo videos
    dir: PathBuf,

    /// Attendee list (CSV/Excel) used to identify teams
    #[arg(short, long)]
    attendees: Option<PathBuf>,

    /// Photo gallery URL for the event
    #[arg(short, long)]
    gallery: Option<String>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process videos one at a time
    #[arg(long, conflicts_with = "concurrency")]
    sequential: bool,

    /// Maximum number of videos analyzed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory for summaries and the thread
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Abort the batch after this many seconds (0 disables the limit)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the batch report as JSON
    #[arg(long)]
    json: bool,
}

/// Validate a schedule date and normalize it to UTC
fn parse_schedule(value: &str) -> Result<String, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
        .map_err(|e| format!("invalid date '{}': {}", value, e))
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_secs();
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    } else if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(LevelFilter::Info);
    }
    builder.init();
}

fn load_config(path: Option<&Path>) -> Result<ReporterConfig> {
    ReporterConfig::load_config(path).context("Failed to load configuration")
}

/// Apply command-line overrides on top of the file configuration
fn apply_overrides(cfg: &mut ReporterConfig, args: &RunArgs) {
    if args.sequential {
        cfg.execution_mode = ExecutionMode::Sequential;
    }
    if let Some(k) = args.concurrency {
        cfg.execution_mode = ExecutionMode::Parallel;
        cfg.max_concurrency = k;
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    if let Some(secs) = args.timeout_secs {
        cfg.batch_timeout_secs = (secs > 0).then_some(secs);
    }
}

async fn run(args: RunArgs) -> Result<bool> {
    let mut cfg = load_config(args.config.as_deref())?;
    apply_overrides(&mut cfg, &args);

    info!("Configuration loaded:");
    info!("  Execution mode: {:?} (max {} in flight)", cfg.execution_mode, cfg.concurrency_limit());
    info!("  Output dir: {}", cfg.output_dir.display());
    info!("  Analyzer: {}", cfg.analyzer.program.display());
    info!("  Aggregator: {}", cfg.aggregator.program.display());

    let mut coordinator = BatchCoordinator::new(
        cfg.clone(),
        Arc::new(CommandAnalyzer::new(cfg.analyzer.clone())),
        Arc::new(CommandAggregator::new(cfg.aggregator.clone())),
    )
    .with_event_sink(Arc::new(LogEventSink));
    if let Some(lookup) = &cfg.lookup {
        debug!("Entity lookup enabled: {}", lookup.program.display());
        coordinator = coordinator.with_lookup(Arc::new(CommandLookup::new(lookup.clone())));
    }

    let mut request = BatchRequest::new(&args.dir);
    if let Some(path) = &args.attendees {
        request = request.attendee_list(path);
    }
    if let Some(url) = &args.gallery {
        request = request.gallery_url(url);
    }

    let report = coordinator.run_batch(request).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?);
    } else {
        print_report(&report);
    }

    Ok(report.is_success())
}

fn print_report(report: &BatchReport) {
    let batch = match report {
        BatchReport::Failed { error } => {
            eprintln!("Error: {}", error);
            return;
        }
        BatchReport::Completed(batch) => batch,
    };

    println!("Successfully processed {} videos!", batch.processed_count);
    if batch.is_degraded() {
        println!("  ({} failed, placeholders were used in the thread)", batch.failed_count);
    }
    println!();
    for item in &batch.outcomes {
        let status = match &item.status {
            reporter::ItemStatus::Succeeded => "ok".to_string(),
            reporter::ItemStatus::Failed { reason } => format!("FAILED: {}", reason),
        };
        println!("  {}. {} [{}]", item.number, item.display_name, status);
    }

    println!();
    println!("Summaries: {}", batch.manifest_path.display());
    println!("Thread:    {}", batch.final_artifact_path.display());
    println!();
    println!("Preview:");
    let lines: Vec<&str> = batch.result.lines().collect();
    for line in lines.iter().take(PREVIEW_LINES) {
        println!("  {}", line);
    }
    if lines.len() > PREVIEW_LINES {
        println!("  ... ({} more lines)", lines.len() - PREVIEW_LINES);
    }
}

fn list(dir: &Path, config: Option<&Path>) -> Result<()> {
    let cfg = load_config(config)?;
    let items = discover_items(dir, &cfg.video_extensions)
        .with_context(|| format!("Failed to list videos in {}", dir.display()))?;

    let total: u64 = items.iter().map(|i| i.size_bytes).sum();
    for (i, item) in items.iter().enumerate() {
        println!("{:>3}. {} ({})", i + 1, item.display_name, format_size(item.size_bytes, BINARY));
    }
    println!("{} video(s), {} total", items.len(), format_size(total, BINARY));
    Ok(())
}

async fn publish(file: &Path, config: Option<&Path>, schedule: Option<String>, share: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read thread file: {}", file.display()))?;

    let publisher = TypefullyPublisher::from_env(cfg.publisher).context("Failed to set up publisher")?;
    let options = PublishOptions {
        schedule_date: schedule,
        share: share.then_some(true),
    };
    let draft = publisher
        .publish(&content, &options)
        .await
        .with_context(|| format!("Failed to publish {}", file.display()))?;

    println!("Draft created: {} ({})", draft.draft_id, draft.status);
    if let Some(when) = &draft.scheduled_at {
        println!("Scheduled for: {}", when);
    }
    if let Some(url) = &draft.share_url {
        println!("Share URL: {}", url);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => {
            if !run(args).await? {
                std::process::exit(1);
            }
        }
        Command::List { dir, config } => list(&dir, config.as_deref())?,
        Command::Publish {
            file,
            config,
            schedule,
            share,
        } => publish(&file, config.as_deref(), schedule, share).await?,
    }

    Ok(())
}
