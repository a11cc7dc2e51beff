//! Upload ingestion: turns what a student submitted into a validated, in-memory
//! manifest and picks the page the project opens on.
//!
//! Nothing in this module touches disk; see [`crate::storage`] for persistence.

mod archive;
mod dispatch;
mod entry;
mod kind;
mod manifest;
pub mod path;

use serde::{Deserialize, Serialize};

pub use archive::{ArchiveError, extract};
pub use dispatch::{IngestError, UploadInput, ingest};
pub use entry::resolve_entry;
pub use kind::{FileKind, content_type, is_markup};
pub use manifest::{ManifestConflict, ManifestEntry, UploadManifest};
pub use path::{PathError, sanitize};

const DEFAULT_MAX_ENTRIES: usize = 500;
const DEFAULT_MAX_ENTRY_BYTES: u64 = 8 * 1024 * 1024;
const DEFAULT_MAX_TOTAL_BYTES: u64 = 64 * 1024 * 1024;

/// Bounds applied to every upload, whatever its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestLimits {
    pub max_entries: usize,
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}
