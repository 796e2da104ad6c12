//! Value objects - Immutable objects defined by their attributes

mod category;
mod field_schema;
mod ids;

pub use category::{Category, UnknownCategory};
pub use field_schema::{FieldKind, FieldSpec, FieldValue, NAME_LABELS};
pub use ids::*;
