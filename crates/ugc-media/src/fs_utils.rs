//! Filesystem helpers: input validation, cross-device moves and scratch paths.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Allocates intermediate file paths for one job.
///
/// Implementations must hand out paths that no other job can collide with.
pub trait ScratchSpace: Send + Sync {
    /// Directory that holds the intermediates.
    fn dir(&self) -> &Path;

    /// A fresh, unused path for an intermediate file.
    fn allocate(&self, label: &str, extension: &str) -> PathBuf;
}

/// Scratch space backed by a plain directory with a counter suffix.
#[derive(Debug)]
pub struct DirScratch {
    dir: PathBuf,
    counter: AtomicU64,
}

impl DirScratch {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl ScratchSpace for DirScratch {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn allocate(&self, label: &str, extension: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}_{}.{}", label, n, extension))
    }
}

/// Fail unless `path` exists and is a non-empty regular file.
pub async fn ensure_non_empty(path: &Path) -> MediaResult<u64> {
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(MediaError::EmptyFile(path.to_path_buf()));
    }
    Ok(meta.len())
}

/// Byte copy without any media processing.
pub async fn copy_file(src: &Path, dst: &Path) -> MediaResult<u64> {
    create_parent(dst).await?;
    Ok(fs::copy(src, dst).await?)
}

/// Remove a file, ignoring "not found". Returns whether something was deleted.
pub fn remove_if_exists(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}

/// Move a file, falling back to copy-and-delete across filesystems.
///
/// The fallback copies into a sibling temp name first and renames it into
/// place, so `dst` never holds a partial file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    create_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            let staging = dst.with_extension("partial");
            if let Err(e) = fs::copy(src, &staging).await {
                remove_if_exists(&staging);
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&staging, dst).await {
                remove_if_exists(&staging);
                return Err(e.into());
            }
            remove_if_exists(src);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}
