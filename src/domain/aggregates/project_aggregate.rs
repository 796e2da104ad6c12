//! Project Aggregate - The root aggregate for a novel project
//!
//! A Project Aggregate contains every world-building element that belongs to
//! a single project, grouped by category. Generated records reach it only
//! through the accumulator, which produces a new aggregate per commit.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;

use crate::domain::entities::{Element, Project};
use crate::domain::value_objects::{Category, ElementId, ProjectId};

/// The Project Aggregate Root
///
/// Within one category an element id appears at most once. Insertion order
/// is kept but carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectAggregate {
    /// The root project entity
    project: Project,
    /// Elements per category
    elements: BTreeMap<Category, Vec<Element>>,
}

impl ProjectAggregate {
    /// Create a new ProjectAggregate from an existing project
    pub fn new(project: Project) -> Self {
        Self {
            project,
            elements: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Get the project ID
    pub fn id(&self) -> &ProjectId {
        &self.project.id
    }

    /// Get the project entity
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Get the elements of one category
    pub fn elements(&self, category: Category) -> &[Element] {
        self.elements
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids of every element of one category
    pub fn element_ids(&self, category: Category) -> HashSet<ElementId> {
        self.elements(category).iter().map(|e| e.id).collect()
    }

    /// Total number of elements across categories
    pub fn element_count(&self) -> usize {
        self.elements.values().map(Vec::len).sum()
    }

    // ========================================================================
    // Finders
    // ========================================================================

    /// Whether an element id is present in a category
    pub fn contains(&self, category: Category, id: &ElementId) -> bool {
        self.elements(category).iter().any(|e| &e.id == id)
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    /// Add an element to its category
    ///
    /// # Invariants
    /// - Element name must not be empty
    /// - Element id must not already exist in the category
    pub fn add_element(&mut self, element: Element) -> Result<(), AggregateError> {
        if element.name.trim().is_empty() {
            return Err(AggregateError::ValidationError(
                "Element name cannot be empty".to_string(),
            ));
        }
        if self.contains(element.category, &element.id) {
            return Err(AggregateError::DuplicateElement(element.id));
        }
        self.elements
            .entry(element.category)
            .or_default()
            .push(element);
        Ok(())
    }

    /// Update the project's metadata
    pub fn update_project(&mut self, title: Option<String>, synopsis: Option<String>) {
        if let Some(t) = title {
            self.project.title = t;
        }
        if let Some(s) = synopsis {
            self.project.synopsis = s;
        }
        self.touch();
    }

    /// Bump the modification timestamp
    pub fn touch(&mut self) {
        self.project.updated_at = Utc::now();
    }
}

/// Errors that can occur when modifying the aggregate
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregateError {
    /// A validation rule was violated
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// The element id is already used in its category
    #[error("Duplicate element: {0}")]
    DuplicateElement(ElementId),
}
