use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub content: Vec<u8>,
}

/// Why a path could not join a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestConflict {
    #[error("more than one file maps to '{0}'")]
    Duplicate(String),
    #[error("'{0}' is used as both a file and a folder")]
    FileAndFolder(String),
}

/// Ordered set of sanitized relative paths and their contents, built in memory
/// before anything touches disk.
///
/// Every path could be written to one directory tree: no two entries share a
/// path, and no entry sits under a name another entry uses as a file.
#[derive(Debug, Clone, Default)]
pub struct UploadManifest {
    entries: Vec<ManifestEntry>,
    paths: HashSet<String>,
    folders: HashSet<String>,
}

impl UploadManifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. The path must already be sanitized.
    pub fn push(&mut self, path: String, content: Vec<u8>) -> Result<(), ManifestConflict> {
        if self.paths.contains(&path) {
            return Err(ManifestConflict::Duplicate(path));
        }
        if self.folders.contains(&path) {
            return Err(ManifestConflict::FileAndFolder(path));
        }
        if let Some(file) = folders_of(&path).find(|folder| self.paths.contains(*folder)) {
            return Err(ManifestConflict::FileAndFolder(file.to_string()));
        }

        self.index(&path);
        self.entries.push(ManifestEntry { path, content });
        Ok(())
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&ManifestEntry) -> bool,
    {
        self.entries.retain(keep);

        self.paths.clear();
        self.folders.clear();
        let paths: Vec<String> = self.entries.iter().map(|e| e.path.clone()).collect();
        for path in &paths {
            self.index(path);
        }
    }

    fn index(&mut self, path: &str) {
        for folder in folders_of(path) {
            self.folders.insert(folder.to_string());
        }
        self.paths.insert(path.to_string());
    }

    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.content.len() as u64).sum()
    }
}

/// Every folder above a path: `a/b/c.html` yields `a` and `a/b`.
fn folders_of(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}
