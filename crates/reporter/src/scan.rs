use std::path::{Path, PathBuf};
use serde::Serialize;
use walkdir::WalkDir;
use crate::error::BatchError;
use log::{debug, info, warn};

/// A video file found in the batch directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File name shown in summaries and reports
    pub display_name: String,
    pub size_bytes: u64,
}

/// Normalize configured extensions: lowercase, no leading dot
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Check whether a path carries one of the (normalized) extensions
fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .map(|ext| extensions.iter().any(|e| *e == ext))
        .unwrap_or(false)
}

/// List the video files directly inside `dir`, sorted by file name
pub fn discover_items(dir: &Path, extensions: &[String]) -> Result<Vec<Item>, BatchError> {
    if !dir.exists() {
        return Err(BatchError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(BatchError::NotADirectory(dir.to_path_buf()));
    }

    let root = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| BatchError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?
            .join(dir)
    };

    let extensions = normalize_extensions(extensions);
    info!("Scanning directory: {}", root.display());

    let mut items = Vec::new();
    let mut files_checked = 0;

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        files_checked += 1;

        let path = entry.path();
        if !has_video_extension(path, &extensions) {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                0
            }
        };

        let display_name = entry.file_name().to_string_lossy().into_owned();
        debug!("Found video: {} ({} bytes)", display_name, size_bytes);

        items.push(Item {
            path: path.to_path_buf(),
            display_name,
            size_bytes,
        });
    }

    info!("Scan complete: checked {} files, found {} videos", files_checked, items.len());

    if items.is_empty() {
        return Err(BatchError::EmptyBatch(dir.to_path_buf()));
    }

    Ok(items)
}
