use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use crate::aggregate::{AggregationRequest, Aggregator};
use crate::analysis::{EntityLookup, LookupQuery, VideoAnalyzer};
use crate::config::CommandSpec;
use crate::job::JobInput;
use crate::outcome::Payload;

/// Replace `{key}` tokens in an argument with their values.
///
/// Single left-to-right pass: substituted values are never scanned again and
/// unknown tokens are kept verbatim.
pub fn substitute(arg: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| vars.get(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Run `spec` with substituted arguments, feeding `stdin` if given, and
/// return trimmed stdout
async fn run_command(spec: &CommandSpec, vars: &HashMap<&str, String>, stdin: Option<&str>) -> Result<String> {
    let args: Vec<String> = spec.args.iter().map(|a| substitute(a, vars)).collect();
    debug!("Running {} {:?}", spec.program.display(), args);

    let mut cmd = Command::new(&spec.program);
    cmd.args(&args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to execute {}", spec.program.display()))?;

    // Feed stdin while stdout/stderr are drained, so neither side can fill a
    // pipe and block the other. A program that exits without reading its
    // input closes the pipe early; that is not an error.
    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e);
                }
                debug!("Program closed stdin after reading part of the input");
            }
        }
        Ok(())
    };
    let run = async {
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.with_context(|| format!("Failed to wait for {}", spec.program.display()))?;
        fed.with_context(|| format!("Failed to write stdin of {}", spec.program.display()))?;
        anyhow::Ok(output)
    };

    let output = match spec.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
            .await
            .with_context(|| format!("{} timed out after {}s", spec.program.display(), secs))??,
        None => run.await?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        anyhow::bail!(
            "{} failed (exit code {}): {}",
            spec.program.display(),
            exit_code,
            stderr.trim()
        );
    }

    let stdout = String::from_utf8(output.stdout)
        .with_context(|| format!("{} output is not valid UTF-8", spec.program.display()))?;
    Ok(stdout.trim().to_string())
}

fn job_vars(job: &JobInput) -> HashMap<&'static str, String> {
    HashMap::from([
        ("video", job.video_path.display().to_string()),
        ("name", job.display_name.clone()),
        ("dir", job.source_dir.display().to_string()),
        (
            "attendees",
            job.attendee_list
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "Not provided".to_string()),
        ),
        ("gallery", job.gallery_url.clone().unwrap_or_default()),
    ])
}

/// Analyzes a video by running an external program and reading its stdout
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    spec: CommandSpec,
}

impl CommandAnalyzer {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl VideoAnalyzer for CommandAnalyzer {
    async fn analyze(&self, job: &JobInput) -> Result<Payload> {
        let text = run_command(&self.spec, &job_vars(job), None)
            .await
            .with_context(|| format!("Analysis of {} failed", job.display_name))?;
        if text.is_empty() {
            anyhow::bail!("{} produced no output for {}", self.spec.program.display(), job.display_name);
        }
        Ok(Payload::Text(text))
    }
}

/// Looks up people/teams by piping the analysis text into an external program
#[derive(Debug, Clone)]
pub struct CommandLookup {
    spec: CommandSpec,
}

impl CommandLookup {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl EntityLookup for CommandLookup {
    async fn lookup(&self, query: &LookupQuery) -> Result<String> {
        let vars = HashMap::from([
            ("name", query.display_name.clone()),
            (
                "attendees",
                query
                    .attendee_list
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "Not provided".to_string()),
            ),
        ]);
        run_command(&self.spec, &vars, Some(&query.analysis)).await
    }
}

/// Composes the thread by piping all summaries into an external program
#[derive(Debug, Clone)]
pub struct CommandAggregator {
    spec: CommandSpec,
}

impl CommandAggregator {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Aggregator for CommandAggregator {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<String> {
        let vars = HashMap::from([
            ("summaries_file", request.summaries_file.display().to_string()),
            ("count", request.video_count.to_string()),
            ("dir", request.source_dir.display().to_string()),
        ]);
        run_command(&self.spec, &vars, Some(&request.all_summaries)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::jobs_named;
    use std::path::PathBuf;

    #[test]
    fn test_substitute_placeholders() {
        let vars = HashMap::from([("video", "/v/a.mp4".to_string()), ("count", "3".to_string())]);
        assert_eq!(substitute("--file={video}", &vars), "--file=/v/a.mp4");
        assert_eq!(substitute("{count} of {count}", &vars), "3 of 3");
        assert_eq!(substitute("{unknown}", &vars), "{unknown}");
        assert_eq!(substitute("{{video}}", &vars), "{/v/a.mp4}");
        assert_eq!(substitute("open { brace", &vars), "open { brace");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let vars = HashMap::from([
            ("video", "/v/x{dir}.mp4".to_string()),
            ("dir", "/v".to_string()),
            ("name", "{video}".to_string()),
        ]);
        for _ in 0..16 {
            assert_eq!(substitute("{video} in {dir}", &vars), "/v/x{dir}.mp4 in /v");
            assert_eq!(substitute("{name}", &vars), "{video}");
        }
    }

    #[test]
    fn test_job_vars_default_attendees() {
        let jobs = jobs_named(&["a.mp4".to_string()]);
        let vars = job_vars(&jobs[0]);
        assert_eq!(vars["attendees"], "Not provided");
        assert_eq!(vars["video"], "/videos/a.mp4");
        assert_eq!(vars["gallery"], "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_analyzer_reads_stdout() {
        let analyzer = CommandAnalyzer::new(CommandSpec::new("sh", &["-c", "echo summary-{name}"]));
        let jobs = jobs_named(&["a.mp4".to_string()]);
        let payload = analyzer.analyze(&jobs[0]).await.unwrap();
        assert_eq!(payload, Payload::Text("summary-a.mp4".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let analyzer = CommandAnalyzer::new(CommandSpec::new("sh", &["-c", "echo quota exceeded >&2; exit 3"]));
        let jobs = jobs_named(&["b.mov".to_string()]);
        let err = analyzer.analyze(&jobs[0]).await.unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("exit code 3"), "{}", msg);
        assert!(msg.contains("quota exceeded"), "{}", msg);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let mut spec = CommandSpec::new("sh", &["-c", "sleep 5"]);
        spec.timeout_secs = Some(1);
        let analyzer = CommandAnalyzer::new(spec);
        let jobs = jobs_named(&["slow.mp4".to_string()]);
        let err = analyzer.analyze(&jobs[0]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aggregator_pipes_summaries() {
        let aggregator = CommandAggregator::new(CommandSpec::new("sh", &["-c", "echo \"{count} videos\"; cat"]));
        let request = AggregationRequest {
            all_summaries: "summary-a\n\n---\n\nsummary-b".to_string(),
            video_count: 2,
            summaries_file: PathBuf::from("output/all_summaries.json"),
            source_dir: PathBuf::from("/videos"),
        };
        let thread = aggregator.aggregate(&request).await.unwrap();
        assert_eq!(thread, "2 videos\nsummary-a\n\n---\n\nsummary-b");
    }

    fn request_with(all_summaries: String) -> AggregationRequest {
        AggregationRequest {
            all_summaries,
            video_count: 2,
            summaries_file: PathBuf::from("output/all_summaries.json"),
            source_dir: PathBuf::from("/videos"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aggregator_may_ignore_stdin() {
        let aggregator = CommandAggregator::new(CommandSpec::new("sh", &["-c", "echo thread-for-{count}"]));
        for size in [1024, 1 << 20] {
            let thread = aggregator.aggregate(&request_with("s".repeat(size))).await.unwrap();
            assert_eq!(thread, "thread-for-2");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_input_streams_through_filter() {
        let mut spec = CommandSpec::new("sh", &["-c", "cat"]);
        spec.timeout_secs = Some(10);
        let aggregator = CommandAggregator::new(spec);
        let input = "0123456789abcdef".repeat(1 << 16) + "\nend";

        let started = std::time::Instant::now();
        let thread = aggregator.aggregate(&request_with(input.clone())).await.unwrap();
        assert_eq!(thread, input);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_covers_stdin_feeding() {
        let mut spec = CommandSpec::new("sh", &["-c", "sleep 5"]);
        spec.timeout_secs = Some(1);
        let aggregator = CommandAggregator::new(spec);

        let started = std::time::Instant::now();
        let err = aggregator.aggregate(&request_with("x".repeat(1 << 20))).await.unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let analyzer = CommandAnalyzer::new(CommandSpec::new("/nonexistent/analyzer-bin", &[]));
        let jobs = jobs_named(&["a.mp4".to_string()]);
        let err = analyzer.analyze(&jobs[0]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to execute"));
    }
}
