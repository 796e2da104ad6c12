//! Aggregates - Cluster of domain objects treated as a single unit

pub mod project_aggregate;

pub use project_aggregate::{AggregateError, ProjectAggregate};
