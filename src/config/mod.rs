mod ingest;
mod server;

pub use ingest::{CONFIG_FILE, IngestConfig};
pub use server::ServerConfig;
