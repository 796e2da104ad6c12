//! Generation registry - Per-project accumulators and run handles
//!
//! A project has exactly one accumulator for its whole lifetime, shared by
//! every run on that project, and at most one run that has not finished.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::application::services::{Accumulator, GenerationRunHandle, ProjectAccumulators};
use crate::domain::value_objects::{GenerationRunId, ProjectId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Project {project_id} already has an active generation run ({run_id})")]
    RunActive {
        project_id: ProjectId,
        run_id: GenerationRunId,
    },
}

pub struct GenerationRegistry {
    accumulators: Arc<ProjectAccumulators>,
    runs: RwLock<HashMap<GenerationRunId, GenerationRunHandle>>,
}

impl GenerationRegistry {
    pub fn new(accumulators: Arc<ProjectAccumulators>) -> Self {
        Self {
            accumulators,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// The project's accumulator, created on first use
    pub async fn accumulator(&self, project_id: ProjectId) -> Arc<Mutex<Accumulator>> {
        self.accumulators.get(project_id).await
    }

    /// Record a new run, refusing it while another run on the project is live
    pub async fn register(&self, handle: GenerationRunHandle) -> Result<(), RegistryError> {
        let mut runs = self.runs.write().await;
        if let Some(active) = runs
            .values()
            .find(|h| h.project_id == handle.project_id && !h.is_finished())
        {
            return Err(RegistryError::RunActive {
                project_id: handle.project_id,
                run_id: active.run_id,
            });
        }
        runs.insert(handle.run_id, handle);
        Ok(())
    }

    pub async fn get(&self, run_id: GenerationRunId) -> Option<GenerationRunHandle> {
        self.runs.read().await.get(&run_id).cloned()
    }

    pub async fn active_run(&self, project_id: ProjectId) -> Option<GenerationRunHandle> {
        self.runs
            .read()
            .await
            .values()
            .find(|h| h.project_id == project_id && !h.is_finished())
            .cloned()
    }

    /// Every known run of a project, oldest first
    pub async fn runs_for(&self, project_id: ProjectId) -> Vec<GenerationRunHandle> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .await
            .values()
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect();
        runs.sort_by_key(|h| h.snapshot().started_at);
        runs
    }

    /// Drop finished runs older than `retention`; returns how many were dropped
    pub async fn prune_finished(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, handle| match handle.snapshot().finished_at {
            Some(finished_at) => now.signed_duration_since(finished_at) < retention,
            None => true,
        });
        let pruned = before - runs.len();
        if pruned > 0 {
            debug!(pruned, "Pruned finished generation runs");
        }
        pruned
    }

    /// Drop the accumulator of a deleted project
    pub async fn forget_project(&self, project_id: ProjectId) {
        self.accumulators.remove(project_id).await;
    }
}
