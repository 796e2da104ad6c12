//! LLM Service - Generation transport backed by a chat-completion model
//!
//! This service implements the two-phase generation protocol on top of any
//! `LlmPort`. It handles:
//!
//! - Building the manifest and detail prompts
//! - Sending them with the configured sampling temperature
//! - Handing the raw reply back untouched; parsing belongs to the caller

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::application::ports::outbound::{
    ChatMessage, GenerationTransportPort, LlmPort, LlmRequest,
};
use crate::application::services::llm::prompt_builder;
use crate::domain::entities::Element;
use crate::domain::value_objects::Category;

/// Default sampling temperature for generation
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default number of existing elements listed in prompts
pub const DEFAULT_MAX_CONTEXT_ELEMENTS: usize = 30;

/// Service for requesting world-building records from a model
///
/// # Example
///
/// ```ignore
/// use wrldbldr_novel_engine::application::services::LLMService;
/// use wrldbldr_novel_engine::infrastructure::ollama::OllamaClient;
///
/// let client = OllamaClient::new("http://localhost:11434/v1", "llama3.2", timeout)?;
/// let service = LLMService::new(client).with_temperature(0.8);
///
/// let raw = service.request_manifest("Three harbour towns", &[]).await?;
/// ```
pub struct LLMService<L: LlmPort> {
    llm: L,
    temperature: f32,
    max_context_elements: usize,
}

impl<L: LlmPort> LLMService<L> {
    /// Create a new LLM service with the provided client
    pub fn new(llm: L) -> Self {
        Self {
            llm,
            temperature: DEFAULT_TEMPERATURE,
            max_context_elements: DEFAULT_MAX_CONTEXT_ELEMENTS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_context_elements(mut self, max: usize) -> Self {
        self.max_context_elements = max;
        self
    }

    async fn complete(&self, system_prompt: String, user_message: String) -> Result<String, LLMServiceError> {
        let request = LlmRequest::new(vec![ChatMessage::user(user_message)])
            .with_system_prompt(system_prompt)
            .with_temperature(self.temperature);

        let response = self
            .llm
            .generate(request)
            .await
            .map_err(|e| LLMServiceError::LlmError(e.to_string()))?;

        debug!(
            model = %response.model,
            tokens = response.tokens_used,
            chars = response.content.len(),
            "LLM reply received"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl<L: LlmPort> GenerationTransportPort for LLMService<L> {
    #[instrument(skip(self, instruction, context), fields(context = context.len()))]
    async fn request_manifest(&self, instruction: &str, context: &[Element]) -> Result<String> {
        let system_prompt = prompt_builder::build_manifest_system_prompt();
        let user_message =
            prompt_builder::build_manifest_user_message(instruction, context, self.max_context_elements);

        Ok(self.complete(system_prompt, user_message).await?)
    }

    #[instrument(skip(self, instruction, context), fields(context = context.len()))]
    async fn request_detail(
        &self,
        item_name: &str,
        category: Category,
        instruction: &str,
        context: &[Element],
    ) -> Result<String> {
        let system_prompt = prompt_builder::build_detail_system_prompt(category);
        let user_message = prompt_builder::build_detail_user_message(
            item_name,
            category,
            instruction,
            context,
            self.max_context_elements,
        );

        Ok(self.complete(system_prompt, user_message).await?)
    }
}

/// Errors that can occur in the LLM service
#[derive(Debug, thiserror::Error)]
pub enum LLMServiceError {
    /// Error from the underlying LLM client
    #[error("LLM error: {0}")]
    LlmError(String),
}
