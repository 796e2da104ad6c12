//! Domain entities - Core business objects with identity

mod element;
mod manifest;
mod project;

pub use element::Element;
pub use manifest::GenerationManifestItem;
pub use project::Project;
