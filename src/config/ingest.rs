use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ingest::IngestLimits;

pub const CONFIG_FILE: &str = "showcase.toml";

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Upload and extraction limits, persisted next to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Largest request body accepted by the upload endpoints.
    pub max_upload_bytes: u64,
    pub limits: IngestLimits,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            limits: IngestLimits::default(),
        }
    }
}

impl IngestConfig {
    #[must_use]
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE)
    }

    /// Loads the config from `data_dir`. A missing file yields the defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::path(data_dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, data_dir: &Path) -> Result<PathBuf> {
        let path = Self::path(data_dir);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to encode config: {e}")))?;
        fs::write(&path, content)?;
        Ok(path)
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".into()));
        }
        if self.limits.max_entries == 0
            || self.limits.max_entry_bytes == 0
            || self.limits.max_total_bytes == 0
        {
            return Err(Error::Config("ingest limits must be positive".into()));
        }
        Ok(())
    }
}
