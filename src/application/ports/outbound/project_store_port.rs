//! Project store port - The slot holding canonical project aggregates
//!
//! Aggregates are published copy-on-write: `read` hands out an immutable
//! snapshot and `write` replaces it wholesale, so a reader never observes a
//! partially merged project.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::aggregates::ProjectAggregate;
use crate::domain::value_objects::ProjectId;

#[async_trait]
pub trait ProjectStorePort: Send + Sync {
    /// Current snapshot of a project, `None` when there is no such project
    async fn read(&self, id: ProjectId) -> Result<Option<Arc<ProjectAggregate>>>;

    /// Publish a new snapshot, replacing the previous one
    async fn write(&self, project: ProjectAggregate) -> Result<()>;

    /// Snapshots of every project
    async fn list(&self) -> Result<Vec<Arc<ProjectAggregate>>>;

    /// Drop a project
    async fn delete(&self, id: ProjectId) -> Result<bool>;
}
