use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::ProjectAggregate;
use crate::domain::entities::Element;
use crate::domain::value_objects::{Category, FieldValue};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequestDto {
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectResponseDto {
    pub id: String,
    pub title: String,
    pub synopsis: String,
    pub created_at: String,
    pub updated_at: String,
    /// Number of elements per category key; empty categories are left out
    pub element_counts: BTreeMap<String, usize>,
}

impl From<&ProjectAggregate> for ProjectResponseDto {
    fn from(aggregate: &ProjectAggregate) -> Self {
        let project = aggregate.project();
        let element_counts = Category::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), aggregate.elements(*c).len()))
            .filter(|(_, count)| *count > 0)
            .collect();

        Self {
            id: project.id.to_string(),
            title: project.title.clone(),
            synopsis: project.synopsis.clone(),
            created_at: project.created_at.to_rfc3339(),
            updated_at: project.updated_at.to_rfc3339(),
            element_counts,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ElementResponseDto {
    pub id: String,
    pub name: String,
    pub category: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl From<&Element> for ElementResponseDto {
    fn from(e: &Element) -> Self {
        Self {
            id: e.id.to_string(),
            name: e.name.clone(),
            category: e.category.as_str().to_string(),
            fields: e.fields.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatedCategoriesResponseDto {
    pub categories: Vec<String>,
}

impl From<Vec<Category>> for UpdatedCategoriesResponseDto {
    fn from(categories: Vec<Category>) -> Self {
        Self {
            categories: categories.iter().map(|c| c.as_str().to_string()).collect(),
        }
    }
}
