//! On-disk media storage for hlsforge.
//!
//! Every media item lives under `<media_root>/<id>/`:
//!
//! ```text
//! <media_root>/<id>/<uploaded file>
//! <media_root>/<id>/hls/index.m3u8
//! <media_root>/<id>/hls/index<N>.ts
//! <media_root>/<id>/hls.staging/        (transcoder output, transient)
//! <media_root>/<id>/.upload-<uuid>.part  (upload in progress, transient)
//! ```
//!
//! [`MediaStore`] owns this layout and the per-ID locks that serialize
//! uploads, deletes and transcode publication.

pub mod locks;
pub mod staging;

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use hf_core::{Error, MediaId, Result, MANIFEST_FILE};
use tokio::io::AsyncWriteExt;

pub use locks::{MediaLock, MediaLocks};
pub use staging::{NewItemGuard, PartialFile};

const HLS_DIR: &str = "hls";
const STAGING_DIR: &str = "hls.staging";

/// A source file persisted by [`MediaStore::write_source_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSource {
    pub path: PathBuf,
    pub file_name: String,
    pub bytes: u64,
}

/// Filesystem-backed media store.
#[derive(Debug)]
pub struct MediaStore {
    root: PathBuf,
    locks: MediaLocks,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: MediaLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -- Layout ---------------------------------------------------------------

    /// `<media_root>/<id>`.
    pub fn resolve_base(&self, id: MediaId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn hls_dir(&self, id: MediaId) -> PathBuf {
        self.resolve_base(id).join(HLS_DIR)
    }

    pub fn staging_dir(&self, id: MediaId) -> PathBuf {
        self.resolve_base(id).join(STAGING_DIR)
    }

    pub fn manifest_path(&self, id: MediaId) -> PathBuf {
        self.hls_dir(id).join(MANIFEST_FILE)
    }

    /// Path of a published segment. Only `index<N>.ts` names are accepted, so
    /// the result always stays inside the item's `hls/` directory.
    pub fn segment_path(&self, id: MediaId, name: &str) -> Result<PathBuf> {
        if hf_core::parse_segment_name(name).is_none() {
            return Err(Error::not_found("segment", name));
        }
        Ok(self.hls_dir(id).join(name))
    }

    // -- Locking --------------------------------------------------------------

    /// Exclusive access to one item's directory tree.
    pub async fn lock(&self, id: MediaId) -> MediaLock {
        self.locks.lock(id).await
    }

    /// Release bookkeeping for an unused lock.
    pub fn prune_lock(&self, id: MediaId) {
        self.locks.prune(id);
    }

    // -- Mutation -------------------------------------------------------------

    /// Create `<base>/hls` if needed. Returns `true` if it was created.
    pub async fn ensure_directory(&self, id: MediaId) -> Result<bool> {
        let dir = self.hls_dir(id);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage("create directory", &dir, e))?;
        tracing::debug!(media_id = %id, "Created {}", dir.display());
        Ok(true)
    }

    /// Guard that removes the item again unless committed, if this call is
    /// the one bringing it into existence.
    pub async fn track_new_item(&self, id: MediaId) -> NewItemGuard {
        NewItemGuard::track(self.resolve_base(id)).await
    }

    /// Stream an uploaded file into the item's base directory.
    ///
    /// Bytes go to a hidden `.upload-*.part` file which is synced and then
    /// renamed over the final name. If the stream yields an error, or the
    /// returned future is dropped, the part file is removed.
    pub async fn write_source_file<S>(
        &self,
        id: MediaId,
        file_name: &str,
        stream: S,
    ) -> Result<StoredSource>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let file_name = sanitize_file_name(file_name)?;
        let base = self.resolve_base(id);
        let dest = base.join(&file_name);
        let partial = PartialFile::new(base.join(format!(".upload-{}.part", uuid::Uuid::new_v4())));

        let mut file = tokio::fs::File::create(partial.path())
            .await
            .map_err(|e| Error::storage("create", partial.path(), e))?;

        let mut bytes = 0u64;
        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::storage("write", partial.path(), e))?;
            bytes += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| Error::storage("flush", partial.path(), e))?;
        file.sync_all()
            .await
            .map_err(|e| Error::storage("sync", partial.path(), e))?;
        drop(file);

        partial.commit(&dest).await?;
        tracing::info!(media_id = %id, bytes, "Stored source file {}", dest.display());

        Ok(StoredSource {
            path: dest,
            file_name,
            bytes,
        })
    }

    /// Remove the item's whole tree. A missing tree is not an error.
    pub async fn remove_all(&self, id: MediaId) -> Result<()> {
        let base = self.resolve_base(id);
        match tokio::fs::remove_dir_all(&base).await {
            Ok(()) => {
                tracing::info!(media_id = %id, "Removed {}", base.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage("remove", &base, e)),
        }
    }

    /// Empty the published `hls/` directory.
    pub async fn clear_hls(&self, id: MediaId) -> Result<()> {
        let dir = self.hls_dir(id);
        remove_dir_if_exists(&dir).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage("create directory", &dir, e))
    }

    /// Create an empty staging directory, discarding leftovers from an
    /// interrupted run.
    pub async fn prepare_staging(&self, id: MediaId) -> Result<PathBuf> {
        let dir = self.staging_dir(id);
        remove_dir_if_exists(&dir).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage("create directory", &dir, e))?;
        Ok(dir)
    }

    /// Replace the published `hls/` directory with the staging directory.
    pub async fn publish_staging(&self, id: MediaId) -> Result<()> {
        let staging = self.staging_dir(id);
        let hls = self.hls_dir(id);
        remove_dir_if_exists(&hls).await?;
        tokio::fs::rename(&staging, &hls)
            .await
            .map_err(|e| Error::storage("publish", &hls, e))?;
        tracing::debug!(media_id = %id, "Published {}", hls.display());
        Ok(())
    }

    pub async fn discard_staging(&self, id: MediaId) -> Result<()> {
        remove_dir_if_exists(&self.staging_dir(id)).await
    }

    /// Whether a published manifest exists.
    pub async fn has_manifest(&self, id: MediaId) -> bool {
        tokio::fs::try_exists(self.manifest_path(id))
            .await
            .unwrap_or(false)
    }
}

/// Reduce an uploaded file name to a safe single path component.
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name.starts_with('.') || name == HLS_DIR || name == STAGING_DIR {
        return Err(Error::BadRequest(format!("unusable file name {raw:?}")));
    }
    Ok(name.to_string())
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::storage("remove", dir, e)),
    }
}
