use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::content::content_router;
use super::user::user_router;
use crate::config::IngestConfig;
use crate::projects::ProjectService;
use crate::storage::ProjectStorage;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub data_dir: PathBuf,
    pub storage: Arc<ProjectStorage>,
    pub projects: ProjectService,
    pub ingest: IngestConfig,
    /// Public base URL for external access. Used when building file links.
    pub public_base_url: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        data_dir: PathBuf,
        ingest: IngestConfig,
        public_base_url: Option<String>,
    ) -> Self {
        let storage = Arc::new(ProjectStorage::new(&data_dir));
        let projects = ProjectService::new(store.clone(), storage.clone(), ingest.limits.clone());

        Self {
            store,
            data_dir,
            storage,
            projects,
            ingest,
            public_base_url,
        }
    }

    /// Link to one file of a project, with each path segment percent-encoded.
    #[must_use]
    pub fn raw_url(&self, project_id: &str, path: &str) -> String {
        let base = self
            .public_base_url
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
        format!(
            "{base}/api/v1/projects/{}/raw/{}",
            urlencoding::encode(project_id),
            encoded.join("/")
        )
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.ingest.max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .nest("/api/v1", content_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn state(temp: &TempDir, base: Option<&str>) -> AppState {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        AppState::new(
            Arc::new(store),
            temp.path().to_path_buf(),
            IngestConfig::default(),
            base.map(String::from),
        )
    }

    #[test]
    fn test_raw_url_encodes_segments() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, Some("https://showcase.example/"));

        assert_eq!(
            state.raw_url("p1", "my pics/cat #1.png"),
            "https://showcase.example/api/v1/projects/p1/raw/my%20pics/cat%20%231.png"
        );
    }

    #[test]
    fn test_raw_url_relative_without_base() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, None);

        assert_eq!(
            state.raw_url("p1", "index.html"),
            "/api/v1/projects/p1/raw/index.html"
        );
    }
}
