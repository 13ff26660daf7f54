use std::fs;
use std::path::{Path, PathBuf};
use serde::Serialize;
use crate::error::BatchError;
use log::{debug, info};

pub const MANIFEST_FILE_NAME: &str = "all_summaries.json";
pub const THREAD_FILE_NAME: &str = "tweet_thread.md";
const SUMMARY_PREFIX: &str = "video_summary_";
const SUMMARY_SUFFIX: &str = ".txt";

/// Ordered summaries of one batch plus the metadata the aggregator needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub summaries: Vec<String>,
    pub item_count: usize,
    pub source_dir: PathBuf,
}

impl Manifest {
    pub fn new(summaries: Vec<String>, source_dir: PathBuf) -> Self {
        Self {
            item_count: summaries.len(),
            summaries,
            source_dir,
        }
    }
}

/// Files produced by one `ArtifactWriter::write` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifacts {
    /// `video_summary_<n>.txt`, in discovery order
    pub summary_paths: Vec<PathBuf>,
    pub manifest_path: PathBuf,
}

/// Get the path of the summary file for the `number`th video (1-based)
pub fn summary_path(output_dir: &Path, number: usize) -> PathBuf {
    output_dir.join(format!("{}{}{}", SUMMARY_PREFIX, number, SUMMARY_SUFFIX))
}

/// Parse the video number out of a summary file name
fn summary_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(SUMMARY_PREFIX)?
        .strip_suffix(SUMMARY_SUFFIX)?
        .parse()
        .ok()
}

fn write_file(path: &Path, content: &str) -> Result<(), BatchError> {
    fs::write(path, content).map_err(|source| BatchError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Persists summaries, the manifest and the final thread under one directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE_NAME)
    }

    pub fn thread_path(&self) -> PathBuf {
        self.output_dir.join(THREAD_FILE_NAME)
    }

    fn ensure_dir(&self) -> Result<(), BatchError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| BatchError::Artifact {
            path: self.output_dir.clone(),
            source,
        })
    }

    /// Write one text file per summary and the JSON manifest
    pub fn write(&self, manifest: &Manifest) -> Result<WrittenArtifacts, BatchError> {
        self.ensure_dir()?;

        let mut summary_paths = Vec::with_capacity(manifest.summaries.len());
        for (i, summary) in manifest.summaries.iter().enumerate() {
            let path = summary_path(&self.output_dir, i + 1);
            write_file(&path, summary)?;
            debug!("Wrote {}", path.display());
            summary_paths.push(path);
        }

        self.remove_stale_summaries(manifest.summaries.len())?;

        let manifest_path = self.manifest_path();
        let mut json = serde_json::to_string_pretty(&manifest.summaries)?;
        json.push('\n');
        write_file(&manifest_path, &json)?;

        info!(
            "Saved {} summaries to {} and {}",
            summary_paths.len(),
            self.output_dir.display(),
            manifest_path.display()
        );

        Ok(WrittenArtifacts {
            summary_paths,
            manifest_path,
        })
    }

    /// Write the aggregated thread and return its path
    pub fn write_thread(&self, content: &str) -> Result<PathBuf, BatchError> {
        self.ensure_dir()?;
        let path = self.thread_path();
        write_file(&path, content)?;
        info!("Saved thread to {}", path.display());
        Ok(path)
    }

    /// Remove summary files left over from an earlier, larger batch
    fn remove_stale_summaries(&self, count: usize) -> Result<(), BatchError> {
        let entries = fs::read_dir(&self.output_dir).map_err(|source| BatchError::Artifact {
            path: self.output_dir.clone(),
            source,
        })?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(number) = name.to_str().and_then(summary_number) else {
                continue;
            };
            if number > count {
                let path = entry.path();
                fs::remove_file(&path).map_err(|source| BatchError::Artifact {
                    path: path.clone(),
                    source,
                })?;
                debug!("Removed stale {}", path.display());
            }
        }
        Ok(())
    }
}
