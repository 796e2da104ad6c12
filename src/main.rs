//! WrldBldr Novel Engine - Backend for AI-assisted novel world-building
//!
//! The Engine is the backend server that:
//! - Holds novel projects and their world-building elements
//! - Runs batch generation of elements through an OpenAI-compatible LLM
//! - Streams generation progress to clients via WebSocket

mod application;
mod domain;
mod infrastructure;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::application::services::GenerationEventPublisher;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http;
use crate::infrastructure::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wrldbldr_novel_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WrldBldr Novel Engine");

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Ollama: {} ({})", config.ollama_base_url, config.ollama_model);
    tracing::info!("  LLM timeout: {:?}", config.llm_timeout);

    // Initialize application state
    let (generation_event_tx, generation_event_rx) = mpsc::unbounded_channel();
    let state = Arc::new(AppState::new(config, generation_event_tx)?);
    tracing::info!("Application state initialized");

    // Generation event publisher (GenerationEvent -> AppEvent on the bus)
    let publisher_task = {
        let publisher = GenerationEventPublisher::new(Arc::new(state.event_bus.clone()));
        tokio::spawn(async move {
            tracing::info!("Starting generation event publisher");
            publisher.run(generation_event_rx).await;
        })
    };

    // Cleanup worker (drops finished runs past their retention)
    let cleanup_worker = {
        let state = state.clone();
        tokio::spawn(async move {
            tracing::info!("Starting generation run cleanup worker");
            let retention = state.config.generation.finished_run_retention;
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                state.generations.prune_finished(retention).await;
            }
        })
    };

    let port = state.config.server_port;

    // Build the router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws/projects/{id}", get(infrastructure::websocket::ws_handler))
        // Merge REST API routes
        .merge(http::create_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    let server = axum::serve(listener, app);

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping workers...");
            publisher_task.abort();
            cleanup_worker.abort();
            tracing::info!("Workers stopped");
        }
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
