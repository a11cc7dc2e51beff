use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use showcase::auth::TokenIssuer;
use showcase::config::IngestConfig;
use showcase::server::{AppState, create_router};
use showcase::store::{SqliteStore, Store};

use super::MultipartBody;

/// The full router backed by a throwaway data directory, driven in-process.
pub struct TestServer {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub admin_token: String,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("parse json body")
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestServer {
    pub fn start() -> Self {
        Self::with_config(IngestConfig::default())
    }

    pub fn with_config(ingest: IngestConfig) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let data_dir = temp_dir.path().to_path_buf();

        let store = SqliteStore::new(data_dir.join("showcase.db")).expect("open store");
        store.initialize().expect("initialize store");

        let issued = TokenIssuer::new()
            .and_then(|issuer| issuer.issue_admin())
            .expect("issue admin token");
        store
            .create_token(&issued.token)
            .expect("store admin token");

        let state = Arc::new(AppState::new(Arc::new(store), data_dir, ingest, None));
        let router = create_router(state.clone());

        Self {
            temp_dir,
            state,
            admin_token: issued.raw,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("route request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body")
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::get(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::delete(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send(
            Request::post(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("build request"),
        )
        .await
    }

    pub async fn upload(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        form: MultipartBody,
    ) -> TestResponse {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, MultipartBody::content_type())
                .body(Body::from(form.finish()))
                .expect("build request"),
        )
        .await
    }

    /// Creates a user through the admin API and returns `(user_id, raw_token)`.
    pub async fn create_user(&self, username: &str, role: &str) -> (String, String) {
        let resp = self
            .post_json(
                "/api/v1/admin/users",
                &self.admin_token,
                serde_json::json!({ "username": username, "role": role }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "create user {username}");
        let user_id = resp.json()["data"]["id"]
            .as_str()
            .expect("user id")
            .to_string();

        let resp = self
            .post_json(
                &format!("/api/v1/admin/users/{user_id}/tokens"),
                &self.admin_token,
                serde_json::json!({}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "create token for {username}");
        let token = resp.json()["data"]["token"]
            .as_str()
            .expect("raw token")
            .to_string();

        (user_id, token)
    }

    /// Uploads a project and returns the `data` object of the response.
    pub async fn create_project(&self, token: &str, form: MultipartBody) -> Value {
        let resp = self.upload("POST", "/api/v1/projects", token, form).await;
        assert_eq!(
            resp.status,
            StatusCode::CREATED,
            "create project: {}",
            String::from_utf8_lossy(&resp.body)
        );
        resp.json()["data"].clone()
    }
}
