//! Drop guards for partially written media.
//!
//! Both guards undo their work when dropped without being committed. A
//! request future that is dropped mid-upload (client disconnect) or an early
//! `?` return therefore never leaves a truncated source file or an empty
//! media directory behind.

use std::path::{Path, PathBuf};

/// A file being written under a temporary name.
///
/// [`PartialFile::commit`] renames it to its final name; otherwise the
/// temporary file is removed on drop.
#[derive(Debug)]
pub struct PartialFile {
    temp_path: PathBuf,
    armed: bool,
}

impl PartialFile {
    pub fn new(temp_path: PathBuf) -> Self {
        Self {
            temp_path,
            armed: true,
        }
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Move the temporary file to `dest`, replacing any existing file.
    pub async fn commit(mut self, dest: &Path) -> hf_core::Result<()> {
        tokio::fs::rename(&self.temp_path, dest)
            .await
            .map_err(|e| hf_core::Error::storage("commit upload to", dest, e))?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            match std::fs::remove_file(&self.temp_path) {
                Ok(()) => tracing::debug!("Removed partial file {}", self.temp_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    "Failed to remove partial file {}: {e}",
                    self.temp_path.display()
                ),
            }
        }
    }
}

/// Tracks whether a media directory was created by the current operation.
///
/// If it was, and the operation is not committed, the whole directory is
/// removed on drop so a failed first upload leaves no media item behind.
#[derive(Debug)]
pub struct NewItemGuard {
    base: Option<PathBuf>,
}

impl NewItemGuard {
    /// Start tracking `base`. Must be called before the directory is created.
    pub async fn track(base: PathBuf) -> Self {
        let existed = tokio::fs::try_exists(&base).await.unwrap_or(true);
        Self {
            base: (!existed).then_some(base),
        }
    }

    /// Keep the directory.
    pub fn commit(mut self) {
        self.base = None;
    }
}

impl Drop for NewItemGuard {
    fn drop(&mut self) {
        if let Some(ref base) = self.base {
            match std::fs::remove_dir_all(base) {
                Ok(()) => tracing::debug!("Removed abandoned media dir {}", base.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {e}", base.display()),
            }
        }
    }
}
