//! Generation API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::application::dto::{GenerationRunResponseDto, StartGenerationRequestDto};
use crate::domain::value_objects::GenerationRunId;
use crate::infrastructure::state::{AppState, StartGenerationError};

use super::project_routes::{parse_project_id, project_error};

fn start_error(error: StartGenerationError) -> (StatusCode, String) {
    match error {
        StartGenerationError::EmptyInstruction => (StatusCode::BAD_REQUEST, error.to_string()),
        StartGenerationError::Project(e) => project_error(e),
        StartGenerationError::RunActive(_) => (StatusCode::CONFLICT, error.to_string()),
    }
}

/// Start a generation run on a project
pub async fn start_generation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StartGenerationRequestDto>,
) -> Result<(StatusCode, Json<GenerationRunResponseDto>), (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let request = req
        .into_request()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let handle = state
        .start_generation(project_id, request)
        .await
        .map_err(start_error)?;

    Ok((StatusCode::ACCEPTED, Json(handle.snapshot().into())))
}

/// List the runs of a project, oldest first
pub async fn list_generations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<GenerationRunResponseDto>>, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let runs = state.generations.runs_for(project_id).await;

    Ok(Json(runs.iter().map(|h| h.snapshot().into()).collect()))
}

/// Get the current status of a run
pub async fn get_generation(
    State(state): State<Arc<AppState>>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<Json<GenerationRunResponseDto>, (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let handle = find_run(&state, &run_id).await?;
    if handle.project_id != project_id {
        return Err((StatusCode::NOT_FOUND, "Generation run not found".to_string()));
    }

    Ok(Json(handle.snapshot().into()))
}

/// Request cancellation of a run; takes effect between items
pub async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<GenerationRunResponseDto>), (StatusCode, String)> {
    let project_id = parse_project_id(&id)?;
    let handle = find_run(&state, &run_id).await?;
    if handle.project_id != project_id {
        return Err((StatusCode::NOT_FOUND, "Generation run not found".to_string()));
    }
    if handle.is_finished() {
        return Err((StatusCode::CONFLICT, "Generation run already finished".to_string()));
    }

    handle.cancel();
    Ok((StatusCode::ACCEPTED, Json(handle.snapshot().into())))
}

async fn find_run(
    state: &AppState,
    run_id: &str,
) -> Result<crate::application::services::GenerationRunHandle, (StatusCode, String)> {
    let run_id = GenerationRunId::parse(run_id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid run ID".to_string()))?;
    state
        .generations
        .get(run_id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Generation run not found".to_string()))
}
