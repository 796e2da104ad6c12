//! Application services - Use case implementations
//!
//! This module contains the application services that implement the use cases
//! for the novel engine. Each service follows hexagonal architecture principles,
//! accepting port dependencies and returning domain aggregates or summaries.

pub mod accumulator;
pub mod consistency_verifier;
pub mod generation_event_publisher;
pub mod generation_service;
pub mod llm;
pub mod llm_service;
pub mod project_service;
pub mod staging_buffer;

pub use accumulator::{Accumulator, CommitOutcome, MergeResult, ProjectAccumulators};
pub use generation_event_publisher::GenerationEventPublisher;
pub use generation_service::{
    GenerationError, GenerationEvent, GenerationRequest, GenerationRun, GenerationRunHandle,
    GenerationService, GenerationSession, GenerationState, GenerationSummary,
};
pub use llm_service::LLMService;
pub use project_service::{
    CreateProjectRequest, ProjectService, ProjectServiceError, ProjectServiceImpl,
    UpdateProjectRequest,
};
