use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use sha2::{Digest, Sha256};

use crate::auth::RequireUser;
use crate::ingest::content_type;
use crate::server::AppState;
use crate::server::dto::{FileEntryResponse, ProjectFilesResponse};
use crate::server::response::{ApiError, ApiResponse};

/// GET /projects/{id}/files - Every stored file, shallowest first
pub async fn list_files(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (project, files) = state.projects.list_files(&auth.user, &id).await?;

    let files = files
        .into_iter()
        .map(|entry| FileEntryResponse {
            url: state.raw_url(&project.id, &entry.path),
            entry,
        })
        .collect();

    Ok(Json(ApiResponse::success(ProjectFilesResponse {
        project_id: project.id,
        entry_file: project.entry_file,
        files,
    })))
}

/// GET /projects/{id}/entry - Redirect to the page a viewer should open first
pub async fn open_entry(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Redirect, ApiError> {
    let project = state.projects.get_project(&auth.user, &id)?;

    let entry = project.entry_file.as_deref().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "no_entry_file",
            "Project has no HTML file to open",
        )
    })?;

    Ok(Redirect::temporary(&state.raw_url(&project.id, entry)))
}

/// GET /projects/{id}/raw/{*path} - Raw file bytes
pub async fn get_raw(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
    request_headers: HeaderMap,
) -> Result<Response, ApiError> {
    let content = state.projects.read_file(&auth.user, &id, &path).await?;
    let etag = etag_for(&content);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-cache"),
    );
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }

    let not_modified = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"));
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&path)),
    );

    Ok((StatusCode::OK, headers, content).into_response())
}

fn etag_for(content: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(content)))
}
