//! On-disk project trees.
//!
//! Each project owns `<data_dir>/projects/<storage_key>/`. Writes are staged in a
//! sibling directory and swapped into place, so a project root only ever holds
//! one complete upload.

mod browser;
mod lock;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

pub use browser::{BrowseError, FileEntry};
pub use lock::{ProjectGuard, ProjectLocks};

use crate::ingest::UploadManifest;

const PROJECTS_DIR: &str = "projects";
const STAGING_DIR: &str = ".staging";
const TRASH_DIR: &str = ".trash";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write '{path}': {source}")]
    PartialWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to move project files into place: {0}")]
    Swap(#[source] std::io::Error),
    #[error("invalid storage key")]
    InvalidKey,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PartialWrite { .. } | Self::Swap(_) => "partial_write",
            Self::InvalidKey => "invalid_storage_key",
            Self::Io(_) => "storage_io",
        }
    }
}

/// A tree change that has happened on disk but can still be undone.
///
/// Hold the project's guard until the swap is finished or rolled back.
#[must_use = "a swap must be finished or rolled back"]
#[derive(Debug)]
pub struct Swap {
    root: PathBuf,
    previous: Option<PathBuf>,
    installed: bool,
}

impl Swap {
    /// Makes the change permanent by deleting the previous tree.
    pub async fn finish(self) {
        if let Some(previous) = self.previous {
            discard(&previous).await;
        }
    }

    /// Removes whatever was installed and puts the previous tree back.
    pub async fn rollback(self) -> Result<(), StorageError> {
        if self.installed {
            match fs::remove_dir_all(&self.root).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Swap(e)),
            }
        }

        if let Some(previous) = &self.previous {
            fs::rename(previous, &self.root)
                .await
                .map_err(StorageError::Swap)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub files_written: usize,
    pub bytes_written: u64,
}

pub struct ProjectStorage {
    base_path: PathBuf,
    locks: ProjectLocks,
}

impl ProjectStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join(PROJECTS_DIR),
            locks: ProjectLocks::new(),
        }
    }

    #[must_use]
    pub fn new_storage_key() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn project_root(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Serializes writers of one project. Hold the guard across a commit and the
    /// metadata update that records it.
    pub async fn lock(&self, key: &str) -> Result<ProjectGuard, StorageError> {
        validate_key(key)?;
        Ok(self.locks.acquire(key).await)
    }

    /// Writes the manifest and settles the swap immediately. For callers with no
    /// metadata to keep in step with the files.
    pub async fn commit(
        &self,
        key: &str,
        manifest: &UploadManifest,
    ) -> Result<WriteResult, StorageError> {
        let guard = self.lock(key).await?;
        let (result, swap) = self.commit_locked(&guard, manifest).await?;
        swap.finish().await;
        Ok(result)
    }

    /// Puts exactly the manifest's files in place of the project's tree.
    ///
    /// The files are written to a staging directory first; on failure nothing
    /// written by this call remains and an existing tree is left as it was. On
    /// success the previous tree waits in trash until the returned [`Swap`] is
    /// finished or rolled back.
    ///
    /// The root is missing between moving the old tree out and the new one in,
    /// so a concurrent lock-free read can see `NotFound` for that instant.
    pub async fn commit_locked(
        &self,
        guard: &ProjectGuard,
        manifest: &UploadManifest,
    ) -> Result<(WriteResult, Swap), StorageError> {
        let root = self.project_root(guard.key())?;
        let staging = self.scratch_path(STAGING_DIR);
        fs::create_dir_all(&staging).await?;

        let result = match write_entries(&staging, manifest).await {
            Ok(result) => result,
            Err(e) => {
                discard(&staging).await;
                return Err(e);
            }
        };

        let previous = match self.move_to_trash(&root).await {
            Ok(previous) => previous,
            Err(e) => {
                discard(&staging).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&staging, &root).await {
            if let Some(trash) = &previous {
                if let Err(restore) = fs::rename(trash, &root).await {
                    warn!("Failed to restore {}: {restore}", root.display());
                }
            }
            discard(&staging).await;
            return Err(StorageError::Swap(e));
        }

        let swap = Swap {
            root,
            previous,
            installed: true,
        };
        Ok((result, swap))
    }

    /// Moves a project's tree aside without deleting it. `None` if there was no tree.
    pub async fn retire_locked(&self, guard: &ProjectGuard) -> Result<Option<Swap>, StorageError> {
        let root = self.project_root(guard.key())?;
        Ok(self.move_to_trash(&root).await?.map(|trash| Swap {
            root,
            previous: Some(trash),
            installed: false,
        }))
    }

    async fn move_to_trash(&self, root: &Path) -> Result<Option<PathBuf>, StorageError> {
        if !fs::try_exists(root).await? {
            return Ok(None);
        }

        let trash = self.scratch_path(TRASH_DIR);
        if let Some(parent) = trash.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(root, &trash).await.map_err(StorageError::Swap)?;
        Ok(Some(trash))
    }

    /// Removes a project's tree. Returns false if there was nothing to remove.
    pub async fn destroy_locked(&self, guard: &ProjectGuard) -> Result<bool, StorageError> {
        let root = self.project_root(guard.key())?;
        match fs::remove_dir_all(&root).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn destroy(&self, key: &str) -> Result<bool, StorageError> {
        let guard = self.lock(key).await?;
        self.destroy_locked(&guard).await
    }

    /// Deletes staging and trash directories left behind by an interrupted process.
    pub async fn sweep(&self) -> Result<(), StorageError> {
        for dir in [STAGING_DIR, TRASH_DIR] {
            match fs::remove_dir_all(self.base_path.join(dir)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }

    /// Removes every project tree. Used by `admin reset`.
    pub async fn purge(&self) -> Result<(), StorageError> {
        match fs::remove_dir_all(&self.base_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn scratch_path(&self, dir: &str) -> PathBuf {
        self.base_path.join(dir).join(Uuid::new_v4().to_string())
    }
}

async fn write_entries(
    staging: &Path,
    manifest: &UploadManifest,
) -> Result<WriteResult, StorageError> {
    let mut result = WriteResult {
        files_written: 0,
        bytes_written: 0,
    };

    for entry in manifest.entries() {
        let target = staging.join(&entry.path);
        let partial = |source| StorageError::PartialWrite {
            path: entry.path.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(partial)?;
        }

        let mut file = File::create(&target).await.map_err(partial)?;
        file.write_all(&entry.content).await.map_err(partial)?;
        file.sync_all().await.map_err(partial)?;

        result.files_written += 1;
        result.bytes_written += entry.content.len() as u64;
    }

    Ok(result)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove {}: {e}", path.display());
        }
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.len() > 64 {
        return Err(StorageError::InvalidKey);
    }

    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(StorageError::InvalidKey);
    }

    Ok(())
}
