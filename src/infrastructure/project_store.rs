//! In-memory project store
//!
//! Each project slot holds an `Arc` snapshot. Writers swap the whole snapshot
//! under a short write lock; readers clone the `Arc` and keep a consistent
//! view for as long as they like.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::application::ports::outbound::ProjectStorePort;
use crate::domain::aggregates::ProjectAggregate;
use crate::domain::value_objects::ProjectId;

#[derive(Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, Arc<ProjectAggregate>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStorePort for InMemoryProjectStore {
    async fn read(&self, id: ProjectId) -> Result<Option<Arc<ProjectAggregate>>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn write(&self, project: ProjectAggregate) -> Result<()> {
        let id = *project.id();
        let elements = project.element_count();
        self.projects.write().await.insert(id, Arc::new(project));
        debug!(project_id = %id, elements, "Published project snapshot");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Arc<ProjectAggregate>>> {
        Ok(self.projects.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: ProjectId) -> Result<bool> {
        Ok(self.projects.write().await.remove(&id).is_some())
    }
}
