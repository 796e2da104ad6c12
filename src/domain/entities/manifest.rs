//! Generation manifest - The list of records a batch run will generate

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Category;

/// Lightweight descriptor produced by the manifest phase and consumed by the
/// detail phase of a generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifestItem {
    pub name: String,
    pub category: Category,
}

impl GenerationManifestItem {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}
