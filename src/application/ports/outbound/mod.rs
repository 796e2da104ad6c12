//! Outbound ports - Interfaces that the application requires from external systems

mod event_bus_port;
mod generation_transport_port;
mod llm_port;
mod project_store_port;

pub use event_bus_port::{EventBusError, EventBusPort};
pub use generation_transport_port::GenerationTransportPort;
pub use llm_port::{ChatMessage, LlmPort, LlmRequest, LlmResponse, MessageRole};
pub use project_store_port::ProjectStorePort;
