//! Infrastructure layer - External adapters and implementations
//!
//! This layer contains:
//! - Config: Application configuration
//! - Ollama: OpenAI-compatible LLM client
//! - Project store: In-memory canonical project snapshots
//! - Event bus: Broadcast fan-out of application events
//! - Generation registry: Per-project accumulators and live runs
//! - HTTP: REST API routes
//! - WebSocket: Project event streams
//! - State: Shared application state

pub mod config;
pub mod event_bus;
pub mod generation_registry;
pub mod http;
pub mod ollama;
pub mod project_store;
pub mod state;
pub mod websocket;
