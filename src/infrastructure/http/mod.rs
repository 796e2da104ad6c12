//! HTTP REST API routes

mod generation_routes;
mod project_routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::infrastructure::state::AppState;

/// Create all API routes
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Project routes
        .route(
            "/api/projects",
            get(project_routes::list_projects).post(project_routes::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(project_routes::get_project)
                .put(project_routes::update_project)
                .delete(project_routes::delete_project),
        )
        .route(
            "/api/projects/{id}/elements/{category}",
            get(project_routes::list_elements),
        )
        .route(
            "/api/projects/{id}/updated-categories",
            get(project_routes::list_updated_categories),
        )
        .route(
            "/api/projects/{id}/updated-categories/{category}/acknowledge",
            post(project_routes::acknowledge_category),
        )
        // Generation routes
        .route(
            "/api/projects/{id}/generations",
            get(generation_routes::list_generations).post(generation_routes::start_generation),
        )
        .route(
            "/api/projects/{id}/generations/{run_id}",
            get(generation_routes::get_generation),
        )
        .route(
            "/api/projects/{id}/generations/{run_id}/cancel",
            post(generation_routes::cancel_generation),
        )
}
