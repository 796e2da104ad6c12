//! Accumulator - Merges staged elements into the project aggregate
//!
//! A commit never mutates the aggregate it was given. It clones, appends the
//! staged elements whose ids are not already present, and hands back the new
//! aggregate for the caller to publish. Replaying a commit with the same
//! staged elements is therefore a no-op after the first application.
//!
//! Categories whose buffers were non-empty are flagged as updated until the
//! presentation layer acknowledges them.
//!
//! Each project has one accumulator behind an async mutex. Whoever replaces a
//! project's snapshot wholesale holds that mutex across the read and the
//! write, so two writers never publish from the same stale snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::application::services::staging_buffer::StagingBuffer;
use crate::domain::aggregates::ProjectAggregate;
use crate::domain::entities::Element;
use crate::domain::value_objects::{Category, ProjectId};

/// Result of a merge
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The new aggregate, to be published by the caller
    pub project: ProjectAggregate,
    /// Categories whose buffers were non-empty, in category order
    pub updated_categories: Vec<Category>,
    /// Elements actually appended
    pub appended: Vec<Element>,
    /// Staged elements dropped because their id was already present
    pub duplicates_skipped: usize,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Committed(MergeResult),
    /// There is no active project; nothing was merged and staging is intact
    NoActiveProject,
}

/// Per-project staging plus the updated-category flags
#[derive(Debug, Default)]
pub struct Accumulator {
    staging: StagingBuffer,
    updated: BTreeSet<Category>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an element for the next commit
    pub fn stage(&mut self, category: Category, element: Element) {
        self.staging.add(category, element);
    }

    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    /// Drop everything staged without merging
    pub fn discard_staged(&mut self) {
        self.staging.clear();
    }

    /// Merge every staging buffer into `project`
    pub fn commit(&mut self, project: Option<&ProjectAggregate>) -> CommitOutcome {
        let Some(project) = project else {
            warn!(staged = self.staging.len(), "Commit skipped: no active project");
            return CommitOutcome::NoActiveProject;
        };

        let mut next = project.clone();
        let mut updated_categories = Vec::new();
        let mut appended = Vec::new();
        let mut duplicates_skipped = 0;

        for (category, staged) in self.staging.drain_all() {
            if staged.is_empty() {
                continue;
            }
            let mut existing: HashSet<_> = next.element_ids(category);
            for element in staged {
                if !existing.insert(element.id) {
                    duplicates_skipped += 1;
                    continue;
                }
                match next.add_element(element.clone()) {
                    Ok(()) => appended.push(element),
                    Err(e) => {
                        warn!(element_id = %element.id, %category, "Dropping staged element: {}", e);
                    }
                }
            }
            self.updated.insert(category);
            updated_categories.push(category);
        }

        if !appended.is_empty() {
            next.touch();
        }

        debug!(
            project_id = %next.id(),
            appended = appended.len(),
            duplicates_skipped,
            "Committed staged elements"
        );

        CommitOutcome::Committed(MergeResult {
            project: next,
            updated_categories,
            appended,
            duplicates_skipped,
        })
    }

    pub fn is_updated(&self, category: Category) -> bool {
        self.updated.contains(&category)
    }

    /// Categories flagged as updated and not yet acknowledged
    pub fn updated_categories(&self) -> Vec<Category> {
        self.updated.iter().copied().collect()
    }

    /// Clear a category's updated flag; returns whether it was set
    pub fn acknowledge(&mut self, category: Category) -> bool {
        self.updated.remove(&category)
    }
}

/// The accumulator of every project, created on first use
#[derive(Debug, Default)]
pub struct ProjectAccumulators {
    accumulators: RwLock<HashMap<ProjectId, Arc<Mutex<Accumulator>>>>,
}

impl ProjectAccumulators {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, project_id: ProjectId) -> Arc<Mutex<Accumulator>> {
        if let Some(existing) = self.accumulators.read().await.get(&project_id) {
            return existing.clone();
        }
        self.accumulators
            .write()
            .await
            .entry(project_id)
            .or_default()
            .clone()
    }

    pub async fn remove(&self, project_id: ProjectId) {
        self.accumulators.write().await.remove(&project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Project;

    fn project() -> ProjectAggregate {
        ProjectAggregate::new(Project::new("Tides"))
    }

    fn committed(outcome: CommitOutcome) -> MergeResult {
        match outcome {
            CommitOutcome::Committed(result) => result,
            CommitOutcome::NoActiveProject => panic!("Expected a commit"),
        }
    }

    #[test]
    fn test_commit_appends_and_flags_category() {
        let mut accumulator = Accumulator::new();
        let original = project();
        accumulator.stage(Category::Place, Element::new("Port Azure", Category::Place));

        let result = committed(accumulator.commit(Some(&original)));

        assert_eq!(result.project.elements(Category::Place).len(), 1);
        assert_eq!(result.updated_categories, vec![Category::Place]);
        assert_eq!(result.appended.len(), 1);
        assert!(accumulator.is_updated(Category::Place));
        assert!(accumulator.staging().is_empty());
        // The input aggregate is untouched
        assert!(original.elements(Category::Place).is_empty());
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut accumulator = Accumulator::new();
        let element = Element::new("Port Azure", Category::Place);

        accumulator.stage(Category::Place, element.clone());
        let first = committed(accumulator.commit(Some(&project())));

        accumulator.stage(Category::Place, element.clone());
        let second = committed(accumulator.commit(Some(&first.project)));

        assert_eq!(second.project.elements(Category::Place).len(), 1);
        assert!(second.appended.is_empty());
        assert_eq!(second.duplicates_skipped, 1);
        assert_eq!(second.updated_categories, vec![Category::Place]);
    }

    #[test]
    fn test_duplicates_within_one_batch_are_merged_once() {
        let mut accumulator = Accumulator::new();
        let element = Element::new("Salt Law", Category::Rule);
        accumulator.stage(Category::Rule, element.clone());
        accumulator.stage(Category::Rule, element.clone());

        let result = committed(accumulator.commit(Some(&project())));

        assert_eq!(result.project.elements(Category::Rule).len(), 1);
        assert_eq!(result.duplicates_skipped, 1);
    }

    #[test]
    fn test_commit_without_project_keeps_staging() {
        let mut accumulator = Accumulator::new();
        accumulator.stage(Category::Place, Element::new("Port Azure", Category::Place));

        let outcome = accumulator.commit(None);

        assert!(matches!(outcome, CommitOutcome::NoActiveProject));
        assert_eq!(accumulator.staging().len(), 1);
        assert!(accumulator.updated_categories().is_empty());
    }

    #[test]
    fn test_only_non_empty_categories_are_flagged() {
        let mut accumulator = Accumulator::new();
        accumulator.stage(Category::Rule, Element::new("Salt Law", Category::Rule));
        accumulator.stage(Category::Culture, Element::new("Tidefolk", Category::Culture));

        let result = committed(accumulator.commit(Some(&project())));

        assert_eq!(result.updated_categories, vec![Category::Culture, Category::Rule]);
        assert!(!accumulator.is_updated(Category::Place));
    }

    #[test]
    fn test_acknowledge_clears_flag() {
        let mut accumulator = Accumulator::new();
        accumulator.stage(Category::Place, Element::new("Port Azure", Category::Place));
        let _ = accumulator.commit(Some(&project()));

        assert!(accumulator.acknowledge(Category::Place));
        assert!(!accumulator.acknowledge(Category::Place));
        assert!(accumulator.updated_categories().is_empty());
    }

    #[test]
    fn test_unnamed_elements_are_dropped() {
        let mut accumulator = Accumulator::new();
        accumulator.stage(Category::Place, Element::new(" ", Category::Place));

        let result = committed(accumulator.commit(Some(&project())));

        assert!(result.appended.is_empty());
        assert!(result.project.elements(Category::Place).is_empty());
    }
}
