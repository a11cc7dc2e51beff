use thiserror::Error;

/// Failures from the database, the on-disk config and token handling.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("token hashing failed: {0}")]
    Hash(String),

    #[error("invalid token format")]
    InvalidTokenFormat,
}

impl Error {
    /// Short machine-readable name, logged next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::TokenLookupCollision => "token_collision",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Hash(_) => "hash",
            Self::InvalidTokenFormat => "invalid_token",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
