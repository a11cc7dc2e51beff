use std::io::{Cursor, Read};

use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use super::IngestLimits;
use super::manifest::{ManifestConflict, UploadManifest};
use super::path::{PathError, sanitize};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive has more than {limit} entries")]
    TooManyEntries { limit: usize },
    #[error("archive entry '{path}' exceeds the {limit} byte limit")]
    EntryTooLarge { path: String, limit: u64 },
    #[error("archive contents exceed the {limit} byte limit")]
    TotalTooLarge { limit: u64 },
    #[error("corrupt archive: {0}")]
    Corrupt(String),
    #[error("archive entry '{path}' rejected: {source}")]
    PathRejected {
        path: String,
        #[source]
        source: PathError,
    },
    #[error("archive contains '{0}' more than once")]
    DuplicatePath(String),
    #[error("archive uses '{0}' as both a file and a folder")]
    PathConflict(String),
}

impl ArchiveError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TooManyEntries { .. } => "too_many_entries",
            Self::EntryTooLarge { .. } => "entry_too_large",
            Self::TotalTooLarge { .. } => "total_too_large",
            Self::Corrupt(_) => "corrupt_archive",
            Self::PathRejected { .. } => "path_rejected",
            Self::DuplicatePath(_) => "duplicate_path",
            Self::PathConflict(_) => "path_conflict",
        }
    }
}

impl From<ManifestConflict> for ArchiveError {
    fn from(e: ManifestConflict) -> Self {
        match e {
            ManifestConflict::Duplicate(path) => Self::DuplicatePath(path),
            ManifestConflict::FileAndFolder(path) => Self::PathConflict(path),
        }
    }
}

impl From<ZipError> for ArchiveError {
    fn from(e: ZipError) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Expands a ZIP archive into a manifest, in archive order.
///
/// Sizes declared in the archive headers are only used for an early reject;
/// the limits are enforced against the bytes actually decompressed.
pub fn extract(bytes: &[u8], limits: &IngestLimits) -> Result<UploadManifest, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    if archive.len() > limits.max_entries {
        return Err(ArchiveError::TooManyEntries {
            limit: limits.max_entries,
        });
    }

    let mut manifest = UploadManifest::new();
    let mut total: u64 = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        if entry.is_dir() {
            continue;
        }

        let raw_name = entry.name().to_string();
        let path = sanitize(&raw_name).map_err(|source| ArchiveError::PathRejected {
            path: raw_name.clone(),
            source,
        })?;

        if entry.size() > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                path,
                limit: limits.max_entry_bytes,
            });
        }

        let mut content = Vec::new();
        (&mut entry)
            .take(limits.max_entry_bytes + 1)
            .read_to_end(&mut content)
            .map_err(|e| ArchiveError::Corrupt(format!("failed to read '{raw_name}': {e}")))?;

        let size = content.len() as u64;
        if size > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                path,
                limit: limits.max_entry_bytes,
            });
        }

        total += size;
        if total > limits.max_total_bytes {
            return Err(ArchiveError::TotalTooLarge {
                limit: limits.max_total_bytes,
            });
        }

        manifest.push(path, content)?;
    }

    Ok(manifest)
}
