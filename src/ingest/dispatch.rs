use thiserror::Error;
use tracing::{debug, warn};

use super::IngestLimits;
use super::archive::{ArchiveError, extract};
use super::kind::FileKind;
use super::manifest::{ManifestConflict, UploadManifest};
use super::path::{PathError, sanitize};
use crate::types::UploadMode;

/// Directory that macOS archivers add alongside the real content.
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Shape of an incoming upload.
#[derive(Debug, Clone)]
pub enum UploadInput {
    SingleFile { filename: String, content: Vec<u8> },
    MultipleFiles(Vec<(String, Vec<u8>)>),
    Archive(Vec<u8>),
}

impl UploadInput {
    #[must_use]
    pub fn mode(&self) -> UploadMode {
        match self {
            Self::SingleFile { .. } => UploadMode::SingleFile,
            Self::MultipleFiles(_) => UploadMode::MultiFile,
            Self::Archive(_) => UploadMode::Archive,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("more than one file maps to '{0}'")]
    DuplicatePath(String),
    #[error("'{0}' is used as both a file and a folder")]
    PathConflict(String),
    #[error("file type not allowed: {0}")]
    UnsupportedType(String),
    #[error("upload contains no files")]
    EmptyUpload,
    #[error("upload has more than {limit} files")]
    TooManyFiles { limit: usize },
    #[error("file '{path}' exceeds the {limit} byte limit")]
    FileTooLarge { path: String, limit: u64 },
    #[error("upload exceeds the {limit} byte limit")]
    TotalTooLarge { limit: u64 },
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPath(e) => e.kind(),
            Self::Archive(e) => e.kind(),
            Self::DuplicatePath(_) => "duplicate_path",
            Self::PathConflict(_) => "path_conflict",
            Self::UnsupportedType(_) => "unsupported_type",
            Self::EmptyUpload => "empty_upload",
            Self::TooManyFiles { .. } => "too_many_entries",
            Self::FileTooLarge { .. } => "entry_too_large",
            Self::TotalTooLarge { .. } => "total_too_large",
        }
    }
}

impl From<ManifestConflict> for IngestError {
    fn from(e: ManifestConflict) -> Self {
        match e {
            ManifestConflict::Duplicate(path) => Self::DuplicatePath(path),
            ManifestConflict::FileAndFolder(path) => Self::PathConflict(path),
        }
    }
}

/// Turns an upload into a manifest of sanitized, allowed files.
///
/// Loose files are checked strictly: one bad name or type fails the upload.
/// Archive entries outside the allow-list are dropped instead, since archives
/// routinely carry files the uploader never chose.
pub fn ingest(upload: UploadInput, limits: &IngestLimits) -> Result<UploadManifest, IngestError> {
    let manifest = match upload {
        UploadInput::SingleFile { filename, content } => {
            let mut manifest = UploadManifest::new();
            let path = sanitize(basename(&filename))?;
            push_strict(&mut manifest, path, content, limits)?;
            manifest
        }
        UploadInput::MultipleFiles(files) => {
            if files.len() > limits.max_entries {
                return Err(IngestError::TooManyFiles {
                    limit: limits.max_entries,
                });
            }

            let mut manifest = UploadManifest::new();
            for (filename, content) in files {
                let path = sanitize(&filename)?;
                push_strict(&mut manifest, path, content, limits)?;
            }
            manifest
        }
        UploadInput::Archive(bytes) => {
            let mut manifest = extract(&bytes, limits)?;
            manifest.retain(|entry| {
                let keep = is_allowed_archive_entry(&entry.path);
                if !keep {
                    debug!(path = %entry.path, "dropping archive entry");
                }
                keep
            });
            manifest
        }
    };

    if manifest.is_empty() {
        warn!("upload produced an empty manifest");
        return Err(IngestError::EmptyUpload);
    }

    Ok(manifest)
}

fn push_strict(
    manifest: &mut UploadManifest,
    path: String,
    content: Vec<u8>,
    limits: &IngestLimits,
) -> Result<(), IngestError> {
    if FileKind::from_path(&path).is_none() {
        return Err(IngestError::UnsupportedType(path));
    }

    if content.len() as u64 > limits.max_entry_bytes {
        return Err(IngestError::FileTooLarge {
            path,
            limit: limits.max_entry_bytes,
        });
    }

    if manifest.total_bytes() + content.len() as u64 > limits.max_total_bytes {
        return Err(IngestError::TotalTooLarge {
            limit: limits.max_total_bytes,
        });
    }

    Ok(manifest.push(path, content)?)
}

fn is_allowed_archive_entry(path: &str) -> bool {
    let hidden = path
        .split('/')
        .any(|segment| segment.starts_with('.') || segment == MACOS_METADATA_DIR);

    !hidden && FileKind::from_path(path).is_some()
}

/// Browsers may send a full client-side path for a single file; only the name is kept.
fn basename(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}
