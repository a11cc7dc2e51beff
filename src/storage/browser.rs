use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;

use super::{ProjectStorage, StorageError};
use crate::ingest::{PathError, sanitize};
use crate::ingest::path::depth;

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("file not found")]
    NotFound,
    #[error("forbidden path: {0}")]
    Forbidden(#[from] PathError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowseError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Storage(e) => e.kind(),
            Self::Io(_) => "storage_io",
        }
    }

    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

impl ProjectStorage {
    /// Lists every regular file in the project, shallowest first, then by path.
    pub async fn list_files(&self, key: &str) -> Result<Vec<FileEntry>, BrowseError> {
        let root = self.project_root(key)?;
        let mut files = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(BrowseError::from_io)?;

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let size = entry.metadata().await?.len();
                    files.push(FileEntry {
                        path: relative_path(&root, &path),
                        size,
                    });
                }
            }
        }

        files.sort_by(|a, b| {
            depth(&a.path)
                .cmp(&depth(&b.path))
                .then_with(|| a.path.cmp(&b.path))
        });

        Ok(files)
    }

    /// Reads one file. The path is sanitized again here no matter where it came from.
    pub async fn read_file(&self, key: &str, raw_path: &str) -> Result<Vec<u8>, BrowseError> {
        let path = self.resolve_file(key, raw_path).await?;
        fs::read(&path).await.map_err(BrowseError::from_io)
    }

    async fn resolve_file(&self, key: &str, raw_path: &str) -> Result<PathBuf, BrowseError> {
        let relative = sanitize(raw_path)?;
        let path = self.project_root(key)?.join(relative);

        let metadata = fs::symlink_metadata(&path)
            .await
            .map_err(BrowseError::from_io)?;
        if !metadata.is_file() {
            return Err(BrowseError::NotFound);
        }

        Ok(path)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::UploadManifest;
    use tempfile::TempDir;

    async fn stored(temp: &TempDir, entries: &[(&str, &[u8])]) -> (ProjectStorage, String) {
        let storage = ProjectStorage::new(temp.path());
        let key = ProjectStorage::new_storage_key();
        let mut manifest = UploadManifest::new();
        for (path, content) in entries {
            manifest.push(path.to_string(), content.to_vec()).unwrap();
        }
        storage.commit(&key, &manifest).await.unwrap();
        (storage, key)
    }

    #[tokio::test]
    async fn test_list_files_sorted_by_depth_then_path() {
        let temp = TempDir::new().unwrap();
        let (storage, key) = stored(
            &temp,
            &[
                ("b/z/deep.js", b"1"),
                ("b/a.css", b"22"),
                ("z.html", b"333"),
                ("a/index.html", b"4"),
                ("index.html", b"5"),
            ],
        )
        .await;

        let files = storage.list_files(&key).await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["index.html", "z.html", "a/index.html", "b/a.css", "b/z/deep.js"]
        );
        assert_eq!(files[1].size, 3);
    }

    #[tokio::test]
    async fn test_read_file() {
        let temp = TempDir::new().unwrap();
        let (storage, key) = stored(&temp, &[("css/site.css", b"body{}")]).await;

        assert_eq!(
            storage.read_file(&key, "css/site.css").await.unwrap(),
            b"body{}".to_vec()
        );
        assert_eq!(
            storage.read_file(&key, "css//./site.css").await.unwrap(),
            b"body{}".to_vec()
        );
    }

    #[tokio::test]
    async fn test_read_file_traversal_is_forbidden() {
        let temp = TempDir::new().unwrap();
        let (storage, key) = stored(&temp, &[("index.html", b"1")]).await;

        let err = storage.read_file(&key, "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, BrowseError::Forbidden(_)));

        let err = storage.read_file(&key, "/etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let temp = TempDir::new().unwrap();
        let (storage, key) = stored(&temp, &[("css/site.css", b"1")]).await;

        assert!(matches!(
            storage.read_file(&key, "missing.html").await,
            Err(BrowseError::NotFound)
        ));
        assert!(matches!(
            storage.read_file(&key, "css").await,
            Err(BrowseError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_files_missing_root() {
        let temp = TempDir::new().unwrap();
        let storage = ProjectStorage::new(temp.path());

        let err = storage
            .list_files(&ProjectStorage::new_storage_key())
            .await
            .unwrap_err();
        assert!(matches!(err, BrowseError::NotFound));
    }
}
