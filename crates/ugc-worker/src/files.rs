//! Per-job intermediate files.
//!
//! All jobs share one work directory. Every name carries the job ID, a
//! microsecond timestamp and a random suffix, so concurrent jobs never touch
//! the same path and need no locking between them.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use ugc_media::fs_utils::remove_if_exists;
use ugc_media::ScratchSpace;
use ugc_models::JobId;

/// Intermediate paths handed out for one job.
///
/// Everything allocated is removed by [`JobFileSet::cleanup`] or on drop,
/// except the path marked with [`JobFileSet::keep`].
#[derive(Debug)]
pub struct JobFileSet {
    work_dir: PathBuf,
    job_tag: String,
    allocated: Mutex<Vec<PathBuf>>,
    keep: Mutex<Option<PathBuf>>,
}

impl JobFileSet {
    pub fn new(work_dir: impl Into<PathBuf>, job_id: &JobId) -> Self {
        let job_tag = job_id
            .short()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect::<String>();
        Self {
            work_dir: work_dir.into(),
            job_tag: if job_tag.is_empty() { "job".to_string() } else { job_tag },
            allocated: Mutex::new(Vec::new()),
            keep: Mutex::new(None),
        }
    }

    /// `{stem}_{job}_{micros}_{rand}.{ext}` inside the work directory.
    pub fn unique_name(&self, stem: &str, extension: &str) -> String {
        format!(
            "{}_{}_{}_{:08x}.{}",
            stem,
            self.job_tag,
            chrono::Utc::now().timestamp_micros(),
            rand::random::<u32>(),
            extension
        )
    }

    /// Exclude `path` from cleanup. Only one path is kept; a later call wins.
    pub fn keep(&self, path: &Path) {
        *self.keep.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
    }

    /// Paths handed out so far.
    pub fn allocated(&self) -> Vec<PathBuf> {
        self.allocated.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Delete every intermediate except the kept one. Returns how many files
    /// were removed. Safe to call more than once.
    pub fn cleanup(&self) -> usize {
        let keep = self.keep.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let paths = std::mem::take(&mut *self.allocated.lock().unwrap_or_else(PoisonError::into_inner));
        let mut removed = 0;
        for path in paths {
            if keep.as_deref() == Some(path.as_path()) {
                continue;
            }
            if remove_if_exists(&path) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(job = %self.job_tag, removed, "Removed intermediate files");
        }
        removed
    }
}

impl ScratchSpace for JobFileSet {
    fn dir(&self) -> &Path {
        &self.work_dir
    }

    fn allocate(&self, label: &str, extension: &str) -> PathBuf {
        let path = self.work_dir.join(self.unique_name(label, extension));
        self.allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.clone());
        path
    }
}

impl Drop for JobFileSet {
    fn drop(&mut self) {
        self.cleanup();
    }
}
