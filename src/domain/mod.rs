//! Domain layer - Core business logic with no external dependencies
//!
//! This layer contains:
//! - Entities: Project, Element, manifest items
//! - Value Objects: identifiers, categories, field schemas
//! - Aggregates: Project aggregate root

pub mod aggregates;
pub mod entities;
pub mod value_objects;
