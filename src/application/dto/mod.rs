//! Data Transfer Objects - For API boundaries
//!
//! DTOs live in the application layer so infrastructure (HTTP/WebSocket) can
//! serialize/deserialize without exposing the domain model's shape.

pub mod events;
pub mod generation;
pub mod project;

pub use events::*;
pub use generation::*;
pub use project::*;
