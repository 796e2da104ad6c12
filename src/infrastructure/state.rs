//! Shared application state

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::application::ports::outbound::GenerationTransportPort;
use crate::application::services::{
    GenerationEvent, GenerationRequest, GenerationRun, GenerationRunHandle, GenerationService,
    LLMService, ProjectAccumulators, ProjectService, ProjectServiceError, ProjectServiceImpl,
};
use crate::domain::value_objects::{Category, ProjectId};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::event_bus::BroadcastEventBus;
use crate::infrastructure::generation_registry::{GenerationRegistry, RegistryError};
use crate::infrastructure::ollama::OllamaClient;
use crate::infrastructure::project_store::InMemoryProjectStore;

#[derive(Debug, thiserror::Error)]
pub enum StartGenerationError {
    #[error("Instruction cannot be empty")]
    EmptyInstruction,
    #[error(transparent)]
    Project(#[from] ProjectServiceError),
    #[error(transparent)]
    RunActive(#[from] RegistryError),
}

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<InMemoryProjectStore>,
    pub event_bus: BroadcastEventBus,
    pub generations: GenerationRegistry,
    // Application services
    pub project_service: ProjectServiceImpl<InMemoryProjectStore>,
    pub generation_service: Arc<GenerationService<dyn GenerationTransportPort, InMemoryProjectStore>>,
}

impl AppState {
    pub fn new(config: AppConfig, generation_events: UnboundedSender<GenerationEvent>) -> Result<Self> {
        // Initialize Ollama client
        let llm_client = OllamaClient::new(&config.ollama_base_url, &config.ollama_model, config.llm_timeout)
            .context("Failed to build LLM client")?;

        let transport = LLMService::new(llm_client)
            .with_temperature(config.llm_temperature)
            .with_max_context_elements(config.generation.max_context_elements);

        Ok(Self::with_transport(config, Arc::new(transport), generation_events))
    }

    /// Build the state around any generation transport
    pub fn with_transport(
        config: AppConfig,
        transport: Arc<dyn GenerationTransportPort>,
        generation_events: UnboundedSender<GenerationEvent>,
    ) -> Self {
        let store = Arc::new(InMemoryProjectStore::new());
        let accumulators = Arc::new(ProjectAccumulators::new());
        let generation_service = Arc::new(GenerationService::new(
            transport,
            store.clone(),
            config.generation.verify_retry_delay,
            generation_events,
        ));

        Self {
            project_service: ProjectServiceImpl::new(store.clone(), accumulators.clone()),
            generation_service,
            generations: GenerationRegistry::new(accumulators),
            event_bus: BroadcastEventBus::new(),
            store,
            config,
        }
    }

    /// Start a generation run on a project in the background
    pub async fn start_generation(
        &self,
        project_id: ProjectId,
        request: GenerationRequest,
    ) -> Result<GenerationRunHandle, StartGenerationError> {
        if request.instruction.trim().is_empty() {
            return Err(StartGenerationError::EmptyInstruction);
        }
        self.project_service.get_project(project_id).await?;

        let (run, handle) = GenerationRun::new(project_id, request);
        self.generations.register(handle.clone()).await?;

        let service = self.generation_service.clone();
        let accumulator = self.generations.accumulator(project_id).await;
        tokio::spawn(async move {
            if let Err(e) = service.run(run, accumulator).await {
                debug!("Generation run ended with error: {}", e);
            }
        });

        info!(project_id = %project_id, run_id = %handle.run_id, "Generation run started");
        Ok(handle)
    }

    /// Cancel the project's live run, if any; returns whether one was found
    pub async fn cancel_generation(&self, project_id: ProjectId) -> bool {
        match self.generations.active_run(project_id).await {
            Some(handle) => {
                handle.cancel();
                info!(project_id = %project_id, run_id = %handle.run_id, "Generation cancel requested");
                true
            }
            None => false,
        }
    }

    /// Delete a project, cancelling its live run first
    pub async fn delete_project(&self, project_id: ProjectId) -> Result<(), ProjectServiceError> {
        self.cancel_generation(project_id).await;
        self.project_service.delete_project(project_id).await?;
        self.generations.forget_project(project_id).await;
        Ok(())
    }

    pub async fn updated_categories(&self, project_id: ProjectId) -> Vec<Category> {
        let accumulator = self.generations.accumulator(project_id).await;
        let accumulator = accumulator.lock().await;
        accumulator.updated_categories()
    }

    pub async fn acknowledge_category(&self, project_id: ProjectId, category: Category) -> bool {
        let accumulator = self.generations.accumulator(project_id).await;
        let mut accumulator = accumulator.lock().await;
        accumulator.acknowledge(category)
    }
}
