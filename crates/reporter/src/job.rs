use std::path::PathBuf;
use serde::Serialize;
use crate::outcome::Outcome;
use crate::scan::Item;

/// Parameters shared by every job in a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchContext {
    /// Directory the videos were discovered in
    pub source_dir: PathBuf,
    /// Attendee list handed to the analysis backend, if one was provided
    pub attendee_list: Option<PathBuf>,
    /// Public gallery where the recordings are published
    pub gallery_url: Option<String>,
}

/// Everything one analysis job needs, built once per discovered video
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInput {
    /// Position in discovery order
    pub index: usize,
    /// Canonical path when resolution succeeded, otherwise the discovered path
    pub video_path: PathBuf,
    pub display_name: String,
    pub source_dir: PathBuf,
    pub attendee_list: Option<PathBuf>,
    pub gallery_url: Option<String>,
    /// Why the path could not be canonicalized; the job settles as a failure
    pub resolution_error: Option<String>,
}

impl JobInput {
    /// 1-based position, used for file names and log lines
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Lifecycle of a job inside the controller
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Running,
    Settled(Outcome),
}

/// Build one job per item, in discovery order
pub fn build_jobs(items: &[Item], ctx: &BatchContext) -> Vec<JobInput> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let (video_path, resolution_error) = match std::fs::canonicalize(&item.path) {
                Ok(p) => (p, None),
                Err(e) => {
                    log::warn!("Failed to resolve {}: {}", item.path.display(), e);
                    (item.path.clone(), Some(format!("cannot resolve {}: {}", item.path.display(), e)))
                }
            };

            JobInput {
                index,
                video_path,
                display_name: item.display_name.clone(),
                source_dir: ctx.source_dir.clone(),
                attendee_list: ctx.attendee_list.clone(),
                gallery_url: ctx.gallery_url.clone(),
                resolution_error,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: PathBuf) -> Item {
        let display_name = path.file_name().unwrap().to_string_lossy().into_owned();
        Item {
            path,
            display_name,
            size_bytes: 0,
        }
    }

    #[test]
    fn test_jobs_follow_item_order_and_share_context() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.mp4", "b.mov", "c.mkv"];
        let items: Vec<_> = names
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                std::fs::write(&p, b"x").unwrap();
                item(p)
            })
            .collect();

        let ctx = BatchContext {
            source_dir: dir.path().to_path_buf(),
            attendee_list: Some(PathBuf::from("/tmp/attendees.csv")),
            gallery_url: Some("https://example.com/gallery".to_string()),
        };

        let jobs = build_jobs(&items, &ctx);
        assert_eq!(jobs.len(), 3);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.index, i);
            assert_eq!(job.number(), i + 1);
            assert_eq!(job.display_name, names[i]);
            assert_eq!(job.gallery_url.as_deref(), Some("https://example.com/gallery"));
            assert!(job.resolution_error.is_none());
        }
    }

    #[test]
    fn test_deleted_file_records_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.mp4");
        std::fs::write(&present, b"x").unwrap();
        let gone = dir.path().join("gone.mp4");

        let jobs = build_jobs(&[item(present), item(gone.clone())], &BatchContext::default());
        assert!(jobs[0].resolution_error.is_none());
        assert_eq!(jobs[1].video_path, gone);
        assert!(jobs[1].resolution_error.as_deref().unwrap().contains("gone.mp4"));
    }
}
