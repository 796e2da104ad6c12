//! Project Service - Application service for project management
//!
//! Creating, reading, updating and deleting projects, plus read access to the
//! elements a project holds. Generated elements never pass through here; they
//! reach the store through the accumulator. Updates and deletes take the
//! project's accumulator lock, so they serialise with generation commits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::application::ports::outbound::ProjectStorePort;
use crate::application::services::accumulator::ProjectAccumulators;
use crate::domain::aggregates::ProjectAggregate;
use crate::domain::entities::{Element, Project};
use crate::domain::value_objects::{Category, ProjectId};

const MAX_TITLE_LEN: usize = 255;
const MAX_SYNOPSIS_LEN: usize = 10_000;

/// Request to create a new project
#[derive(Debug, Clone)]
pub struct CreateProjectRequest {
    pub title: String,
    pub synopsis: String,
}

/// Request to update an existing project
#[derive(Debug, Clone, Default)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub synopsis: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectServiceError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Project not found: {0}")]
    NotFound(ProjectId),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, ProjectServiceError>;

/// Project service trait defining the application use cases
#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn create_project(&self, request: CreateProjectRequest) -> Result<Arc<ProjectAggregate>>;

    async fn get_project(&self, id: ProjectId) -> Result<Arc<ProjectAggregate>>;

    async fn list_projects(&self) -> Result<Vec<Arc<ProjectAggregate>>>;

    async fn update_project(
        &self,
        id: ProjectId,
        request: UpdateProjectRequest,
    ) -> Result<Arc<ProjectAggregate>>;

    async fn delete_project(&self, id: ProjectId) -> Result<()>;

    /// Elements of one category, in insertion order
    async fn list_elements(&self, id: ProjectId, category: Category) -> Result<Vec<Element>>;
}

/// Default implementation of ProjectService over a project store
pub struct ProjectServiceImpl<S: ProjectStorePort> {
    store: Arc<S>,
    accumulators: Arc<ProjectAccumulators>,
}

impl<S: ProjectStorePort> ProjectServiceImpl<S> {
    pub fn new(store: Arc<S>, accumulators: Arc<ProjectAccumulators>) -> Self {
        Self { store, accumulators }
    }

    fn validate_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(ProjectServiceError::Validation(
                "Project title cannot be empty".to_string(),
            ));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ProjectServiceError::Validation(format!(
                "Project title cannot exceed {} characters",
                MAX_TITLE_LEN
            )));
        }
        Ok(())
    }

    fn validate_synopsis(synopsis: &str) -> Result<()> {
        if synopsis.chars().count() > MAX_SYNOPSIS_LEN {
            return Err(ProjectServiceError::Validation(format!(
                "Project synopsis cannot exceed {} characters",
                MAX_SYNOPSIS_LEN
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ProjectStorePort> ProjectService for ProjectServiceImpl<S> {
    #[instrument(skip(self), fields(title = %request.title))]
    async fn create_project(&self, request: CreateProjectRequest) -> Result<Arc<ProjectAggregate>> {
        Self::validate_title(&request.title)?;
        Self::validate_synopsis(&request.synopsis)?;

        let project = Project::new(request.title.trim()).with_synopsis(request.synopsis);
        let id = project.id;
        self.store.write(ProjectAggregate::new(project)).await?;

        info!(project_id = %id, "Created project");
        self.get_project(id).await
    }

    async fn get_project(&self, id: ProjectId) -> Result<Arc<ProjectAggregate>> {
        self.store
            .read(id)
            .await?
            .ok_or(ProjectServiceError::NotFound(id))
    }

    async fn list_projects(&self) -> Result<Vec<Arc<ProjectAggregate>>> {
        let mut projects = self.store.list().await?;
        projects.sort_by(|a, b| a.project().created_at.cmp(&b.project().created_at));
        Ok(projects)
    }

    #[instrument(skip(self, request))]
    async fn update_project(
        &self,
        id: ProjectId,
        request: UpdateProjectRequest,
    ) -> Result<Arc<ProjectAggregate>> {
        if let Some(title) = &request.title {
            Self::validate_title(title)?;
        }
        if let Some(synopsis) = &request.synopsis {
            Self::validate_synopsis(synopsis)?;
        }

        let accumulator = self.accumulators.get(id).await;
        let _guard = accumulator.lock().await;

        let current = self.get_project(id).await?;
        let mut next = (*current).clone();
        next.update_project(request.title.map(|t| t.trim().to_string()), request.synopsis);
        let updated = Arc::new(next.clone());
        self.store.write(next).await?;

        debug!(project_id = %id, "Updated project");
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete_project(&self, id: ProjectId) -> Result<()> {
        let accumulator = self.accumulators.get(id).await;
        let _guard = accumulator.lock().await;

        if !self.store.delete(id).await? {
            return Err(ProjectServiceError::NotFound(id));
        }
        info!(project_id = %id, "Deleted project");
        Ok(())
    }

    async fn list_elements(&self, id: ProjectId, category: Category) -> Result<Vec<Element>> {
        let project = self.get_project(id).await?;
        Ok(project.elements(category).to_vec())
    }
}
