//! Consistency Verifier - Read-after-write check of committed elements
//!
//! After a commit is published the verifier re-reads the store and looks for
//! each appended element. A missing element gets exactly one more stage,
//! commit and write, then a second look. If it is still missing the caller is
//! told so and no further attempt is made.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::application::ports::outbound::ProjectStorePort;
use crate::application::services::accumulator::{Accumulator, CommitOutcome};
use crate::domain::aggregates::ProjectAggregate;
use crate::domain::entities::Element;
use crate::domain::value_objects::{Category, ElementId, ProjectId};

/// Whether `element_id` is present in `category` of `project`
pub fn verify(project: &ProjectAggregate, category: Category, element_id: &ElementId) -> bool {
    project.contains(category, element_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Present on the first read
    Confirmed,
    /// Missing on the first read, present after the retry
    Recovered,
    /// Still missing after the retry
    Missing,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no active project {0}")]
    NoActiveProject(ProjectId),
    #[error("project store failure: {0}")]
    Store(#[from] anyhow::Error),
}

pub struct ConsistencyVerifier<S: ProjectStorePort> {
    store: Arc<S>,
    retry_delay: Duration,
}

impl<S: ProjectStorePort> ConsistencyVerifier<S> {
    pub fn new(store: Arc<S>, retry_delay: Duration) -> Self {
        Self { store, retry_delay }
    }

    /// Confirm that `element` reached the canonical project
    #[instrument(skip(self, accumulator, element), fields(element_id = %element.id, category = %element.category))]
    pub async fn confirm(
        &self,
        project_id: ProjectId,
        accumulator: &mut Accumulator,
        element: &Element,
    ) -> Result<Verification, VerifyError> {
        if self.is_present(project_id, element).await? {
            return Ok(Verification::Confirmed);
        }

        warn!(name = %element.name, "Committed element not visible, retrying once");
        if !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
        }

        let snapshot = self.store.read(project_id).await?;
        accumulator.stage(element.category, element.clone());
        match accumulator.commit(snapshot.as_deref()) {
            CommitOutcome::Committed(result) => self.store.write(result.project).await?,
            CommitOutcome::NoActiveProject => {
                accumulator.discard_staged();
                return Err(VerifyError::NoActiveProject(project_id));
            }
        }

        if self.is_present(project_id, element).await? {
            debug!("Element visible after retry");
            Ok(Verification::Recovered)
        } else {
            warn!(name = %element.name, "Element still missing after retry");
            Ok(Verification::Missing)
        }
    }

    async fn is_present(&self, project_id: ProjectId, element: &Element) -> Result<bool, VerifyError> {
        let snapshot = self.store.read(project_id).await?;
        match snapshot {
            Some(project) => Ok(verify(&project, element.category, &element.id)),
            None => Err(VerifyError::NoActiveProject(project_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use super::*;
    use crate::domain::entities::Project;

    /// Store that silently drops the first `drop_writes` writes
    struct FlakyStore {
        project: RwLock<Option<Arc<ProjectAggregate>>>,
        drop_writes: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FlakyStore {
        fn new(project: ProjectAggregate, drop_writes: usize) -> Self {
            Self {
                project: RwLock::new(Some(Arc::new(project))),
                drop_writes: AtomicUsize::new(drop_writes),
                writes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProjectStorePort for FlakyStore {
        async fn read(&self, _id: ProjectId) -> Result<Option<Arc<ProjectAggregate>>> {
            Ok(self.project.read().await.clone())
        }

        async fn write(&self, project: ProjectAggregate) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.drop_writes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.drop_writes.store(remaining - 1, Ordering::SeqCst);
                return Ok(());
            }
            *self.project.write().await = Some(Arc::new(project));
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Arc<ProjectAggregate>>> {
            Ok(self.project.read().await.iter().cloned().collect())
        }

        async fn delete(&self, _id: ProjectId) -> Result<bool> {
            Ok(self.project.write().await.take().is_some())
        }
    }

    /// Stage, commit and write once, the way the orchestrator does
    async fn commit_once(store: &FlakyStore, accumulator: &mut Accumulator, element: &Element) -> ProjectId {
        let snapshot = store.read(ProjectId::new()).await.unwrap().unwrap();
        accumulator.stage(element.category, element.clone());
        match accumulator.commit(Some(&snapshot)) {
            CommitOutcome::Committed(result) => store.write(result.project).await.unwrap(),
            CommitOutcome::NoActiveProject => panic!("Expected a commit"),
        }
        *snapshot.id()
    }

    #[test]
    fn test_verify_checks_category_membership() {
        let element = Element::new("Port Azure", Category::Place);
        let mut project = ProjectAggregate::new(Project::new("Tides"));
        project.add_element(element.clone()).unwrap();

        assert!(verify(&project, Category::Place, &element.id));
        assert!(!verify(&project, Category::Rule, &element.id));
    }

    #[tokio::test]
    async fn test_confirmed_without_retry() {
        let store = Arc::new(FlakyStore::new(ProjectAggregate::new(Project::new("Tides")), 0));
        let verifier = ConsistencyVerifier::new(store.clone(), Duration::ZERO);
        let mut accumulator = Accumulator::new();
        let element = Element::new("Port Azure", Category::Place);

        let project_id = commit_once(&store, &mut accumulator, &element).await;
        let result = verifier.confirm(project_id, &mut accumulator, &element).await.unwrap();

        assert_eq!(result, Verification::Confirmed);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_write_is_recovered_by_one_retry() {
        let store = Arc::new(FlakyStore::new(ProjectAggregate::new(Project::new("Tides")), 1));
        let verifier = ConsistencyVerifier::new(store.clone(), Duration::ZERO);
        let mut accumulator = Accumulator::new();
        let element = Element::new("Port Azure", Category::Place);

        let project_id = commit_once(&store, &mut accumulator, &element).await;
        let result = verifier.confirm(project_id, &mut accumulator, &element).await.unwrap();

        assert_eq!(result, Verification::Recovered);
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        let project = store.read(project_id).await.unwrap().unwrap();
        assert_eq!(project.elements(Category::Place).len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_exactly_one_retry() {
        let store = Arc::new(FlakyStore::new(ProjectAggregate::new(Project::new("Tides")), usize::MAX));
        let verifier = ConsistencyVerifier::new(store.clone(), Duration::ZERO);
        let mut accumulator = Accumulator::new();
        let element = Element::new("Port Azure", Category::Place);

        let project_id = commit_once(&store, &mut accumulator, &element).await;
        let result = verifier.confirm(project_id, &mut accumulator, &element).await.unwrap();

        assert_eq!(result, Verification::Missing);
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        assert!(accumulator.staging().is_empty());
    }

    #[tokio::test]
    async fn test_missing_project_is_reported() {
        let store = Arc::new(FlakyStore::new(ProjectAggregate::new(Project::new("Tides")), 0));
        let verifier = ConsistencyVerifier::new(store.clone(), Duration::ZERO);
        let mut accumulator = Accumulator::new();
        let element = Element::new("Port Azure", Category::Place);
        store.delete(ProjectId::new()).await.unwrap();

        let result = verifier.confirm(ProjectId::new(), &mut accumulator, &element).await;

        assert!(matches!(result, Err(VerifyError::NoActiveProject(_))));
    }
}
