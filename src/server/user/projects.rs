use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::upload::read_upload_form;
use crate::auth::RequireUser;
use crate::projects::{IngestOutcome, NewProject, ProjectError};
use crate::server::AppState;
use crate::server::dto::{ListProjectsParams, ProjectResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, paginate,
};
use crate::server::validation::{validate_context, validate_description, validate_title};
use crate::types::Project;

pub(crate) fn project_response(
    state: &AppState,
    project: Project,
    warning: Option<String>,
) -> ProjectResponse {
    let entry_url = project
        .entry_file
        .as_deref()
        .map(|entry| state.raw_url(&project.id, entry));

    ProjectResponse {
        project,
        entry_url,
        warning,
    }
}

fn outcome_response(state: &AppState, outcome: IngestOutcome) -> ProjectResponse {
    project_response(state, outcome.project, outcome.warning)
}

/// POST /projects - Upload a new project
pub async fn create_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    if !auth.user.role.can_upload() {
        return Err(ProjectError::UploadNotAllowed.into());
    }

    let form = read_upload_form(&mut multipart).await?;

    let title = validate_title(form.title.as_deref().unwrap_or(""))?;
    let description = validate_description(form.description.as_deref().unwrap_or(""))?;
    if let Some(context) = &form.context {
        validate_context(context)?;
    }
    let context = form.context.clone();

    let outcome = state
        .projects
        .create_project(
            &auth.user,
            NewProject {
                title,
                description,
                context,
                upload: form.into_upload()?,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(outcome_response(&state, outcome))),
    ))
}

/// GET /projects - The caller's projects, or a whole class with `?context=`
pub async fn list_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListProjectsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let projects = match params.context.as_deref() {
        Some(context) => {
            state
                .projects
                .list_context_projects(&auth.user, context, cursor, DEFAULT_PAGE_SIZE + 1)?
        }
        None => state
            .projects
            .list_projects(&auth.user, cursor, DEFAULT_PAGE_SIZE + 1)?,
    };

    let (projects, next_cursor, has_more) =
        paginate(projects, DEFAULT_PAGE_SIZE as usize, |p| p.id.clone());

    let responses: Vec<ProjectResponse> = projects
        .into_iter()
        .map(|p| project_response(&state, p, None))
        .collect();

    Ok(Json(PaginatedResponse::new(responses, next_cursor, has_more)))
}

/// GET /projects/{id}
pub async fn get_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.projects.get_project(&auth.user, &id)?;
    Ok(Json(ApiResponse::success(project_response(
        &state, project, None,
    ))))
}

/// PUT /projects/{id}/files - Replace every file of a project
pub async fn replace_files(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_upload_form(&mut multipart).await?;

    let outcome = state
        .projects
        .replace_files(&auth.user, &id, form.into_upload()?)
        .await?;

    Ok(Json(ApiResponse::success(outcome_response(&state, outcome))))
}

/// DELETE /projects/{id}
pub async fn delete_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.projects.delete_project(&auth.user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
