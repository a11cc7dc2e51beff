use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Error, Result};

const DATABASE_FILE: &str = "showcase.db";
const ADMIN_TOKEN_FILE: &str = ".admin_token";

/// Where the server listens and where it keeps its data.
///
/// Everything lives under `data_dir`: the database, the admin token file,
/// `showcase.toml` and the `projects/` tree.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Prefix for file links handed to browsers, e.g. "https://showcase.school.example".
    /// Links stay relative when unset.
    pub public_base_url: Option<String>,
}

impl ServerConfig {
    /// A config with default host and port for the commands that only touch `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    #[must_use]
    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join(ADMIN_TOKEN_FILE)
    }

    /// Rejects a base URL that would produce broken links. A trailing slash is tolerated.
    pub fn validate(&self) -> Result<()> {
        let Some(base) = &self.public_base_url else {
            return Ok(());
        };

        let rest = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"))
            .ok_or_else(|| {
                Error::Config(format!(
                    "public base URL must start with http:// or https://, got '{base}'"
                ))
            })?;

        let host = rest.split_once('/').map_or(rest, |(host, _)| host);
        if host.is_empty() {
            return Err(Error::Config(format!("public base URL has no host: '{base}'")));
        }
        if rest.contains(['?', '#']) {
            return Err(Error::Config(format!(
                "public base URL cannot carry a query or fragment: '{base}'"
            )));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
        }
    }
}
