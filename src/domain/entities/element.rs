//! Element entity - A single world-building record of a novel project

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Category, ElementId, FieldValue};

/// A world-building record (a place, a rule, a culture, ...)
///
/// The identifier is assigned once at creation and never reused. `fields`
/// always carries every attribute of the category schema; attributes the
/// writer has not filled are present with an empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    pub category: Category,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Element {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        let fields = category
            .schema()
            .iter()
            .map(|spec| (spec.field.to_string(), spec.empty_value()))
            .collect();

        Self {
            id: ElementId::new(),
            name: name.into(),
            category,
            fields,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn with_text(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_field(field, FieldValue::Text(value.into()))
    }

    pub fn field(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Text of a field, empty when missing or a list
    pub fn text(&self, field: &str) -> &str {
        self.field(field).and_then(FieldValue::as_text).unwrap_or("")
    }

    /// The description attribute, shared by every category
    pub fn description(&self) -> &str {
        self.text("description")
    }

    /// Move the element to another category, keeping values that exist in
    /// both schemas and filling the rest with empty defaults
    pub fn recategorize(&mut self, category: Category) {
        if self.category == category {
            return;
        }
        let mut fields = BTreeMap::new();
        for spec in category.schema() {
            let value = self
                .fields
                .remove(spec.field)
                .unwrap_or_else(|| spec.empty_value());
            fields.insert(spec.field.to_string(), value);
        }
        self.fields = fields;
        self.category = category;
    }
}
