mod handlers;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::server::AppState;

pub fn content_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/{id}/files", get(handlers::list_files))
        .route("/projects/{id}/entry", get(handlers::open_entry))
        .route("/projects/{id}/raw/{*path}", get(handlers::get_raw))
}
