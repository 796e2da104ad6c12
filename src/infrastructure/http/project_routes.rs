//! Project API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::dto::{
    CreateProjectRequestDto, ElementResponseDto, ProjectResponseDto, UpdatedCategoriesResponseDto,
};
use crate::application::services::{
    CreateProjectRequest, ProjectService, ProjectServiceError, UpdateProjectRequest,
};
use crate::domain::value_objects::{Category, ProjectId};
use crate::infrastructure::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequestDto {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
}

pub(super) fn parse_project_id(id: &str) -> Result<ProjectId, (StatusCode, String)> {
    ProjectId::parse(id).map_err(|_| (StatusCode::BAD_REQUEST, "Invalid project ID".to_string()))
}

pub(super) fn parse_category(category: &str) -> Result<Category, (StatusCode, String)> {
    category
        .parse::<Category>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

pub(super) fn project_error(error: ProjectServiceError) -> (StatusCode, String) {
    match error {
        ProjectServiceError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        ProjectServiceError::NotFound(_) => (StatusCode::NOT_FOUND, error.to_string()),
        ProjectServiceError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// List all projects
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectResponseDto>>, (StatusCode, String)> {
    let projects = state
        .project_service
        .list_projects()
        .await
        .map_err(project_error)?;

    Ok(Json(projects.iter().map(|p| ProjectResponseDto::from(p.as_ref())).collect()))
}

/// Create a new project
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequestDto>,
) -> Result<(StatusCode, Json<ProjectResponseDto>), (StatusCode, String)> {
    let project = state
        .project_service
        .create_project(CreateProjectRequest {
            title: req.title,
            synopsis: req.synopsis,
        })
        .await
        .map_err(project_error)?;

    Ok((StatusCode::CREATED, Json(ProjectResponseDto::from(project.as_ref()))))
}

/// Get a project by ID
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProjectResponseDto>, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let project = state
        .project_service
        .get_project(project_id)
        .await
        .map_err(project_error)?;

    Ok(Json(ProjectResponseDto::from(project.as_ref())))
}

/// Update a project's title or synopsis
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProjectRequestDto>,
) -> Result<Json<ProjectResponseDto>, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let project = state
        .project_service
        .update_project(
            project_id,
            UpdateProjectRequest {
                title: req.title,
                synopsis: req.synopsis,
            },
        )
        .await
        .map_err(project_error)?;

    Ok(Json(ProjectResponseDto::from(project.as_ref())))
}

/// Delete a project, cancelling any run in progress on it
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    state
        .delete_project(project_id)
        .await
        .map_err(project_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// List the elements of one category
pub async fn list_elements(
    State(state): State<Arc<AppState>>,
    Path((id, category)): Path<(String, String)>,
) -> Result<Json<Vec<ElementResponseDto>>, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let category = parse_category(&category)?;
    let elements = state
        .project_service
        .list_elements(project_id, category)
        .await
        .map_err(project_error)?;

    Ok(Json(elements.iter().map(ElementResponseDto::from).collect()))
}

/// Categories updated by generation and not yet acknowledged
pub async fn list_updated_categories(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UpdatedCategoriesResponseDto>, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    state
        .project_service
        .get_project(project_id)
        .await
        .map_err(project_error)?;

    Ok(Json(state.updated_categories(project_id).await.into()))
}

/// Clear a category's updated flag
pub async fn acknowledge_category(
    State(state): State<Arc<AppState>>,
    Path((id, category)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let category = parse_category(&category)?;
    state
        .project_service
        .get_project(project_id)
        .await
        .map_err(project_error)?;

    state.acknowledge_category(project_id, category).await;
    Ok(StatusCode::NO_CONTENT)
}
