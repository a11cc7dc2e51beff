//! # Showcase
//!
//! A self-hostable server where students upload small web projects (a single
//! page, a set of files, or a zip archive) and teachers and parents open them.
//! Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! showcase = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use showcase::config::IngestConfig;
//! use showcase::server::{AppState, create_router};
//! use showcase::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/showcase.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     PathBuf::from("./data"),
//!     IngestConfig::default(),
//!     None,
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! Uploads can also be ingested without HTTP through [`projects::ProjectService`].
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `showcase` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod projects;
pub mod server;
pub mod storage;
pub mod store;
pub mod types;
