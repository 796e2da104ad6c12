//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Ollama API base URL (OpenAI-compatible)
    pub ollama_base_url: String,
    /// Default model for LLM requests
    pub ollama_model: String,
    /// Sampling temperature for generation requests
    pub llm_temperature: f32,
    /// Per-request timeout for the LLM client
    pub llm_timeout: Duration,

    /// HTTP/WebSocket server port
    pub server_port: u16,

    pub generation: GenerationConfig,
}

/// Tuning of the batch generation pipeline
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Pause before the verifier's single retry
    pub verify_retry_delay: Duration,
    /// How many existing elements are listed in prompts
    pub max_context_elements: usize,
    /// How long finished runs stay queryable
    pub finished_run_retention: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            verify_retry_delay: Duration::from_millis(50),
            max_context_elements: 30,
            finished_run_retention: Duration::from_secs(600),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = GenerationConfig::default();

        Ok(Self {
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            llm_temperature: parse_var("LLM_TEMPERATURE", 0.7)
                .context("LLM_TEMPERATURE must be a number")?,
            llm_timeout: Duration::from_secs(
                parse_var("LLM_TIMEOUT_SECS", 120)
                    .context("LLM_TIMEOUT_SECS must be a whole number of seconds")?,
            ),

            server_port: parse_var("SERVER_PORT", 3000)
                .context("SERVER_PORT must be a valid port number")?,

            generation: GenerationConfig {
                verify_retry_delay: Duration::from_millis(
                    parse_var(
                        "GENERATION_VERIFY_RETRY_DELAY_MS",
                        defaults.verify_retry_delay.as_millis() as u64,
                    )
                    .context("GENERATION_VERIFY_RETRY_DELAY_MS must be a whole number of milliseconds")?,
                ),
                max_context_elements: parse_var(
                    "GENERATION_MAX_CONTEXT_ELEMENTS",
                    defaults.max_context_elements,
                )
                .context("GENERATION_MAX_CONTEXT_ELEMENTS must be a whole number")?,
                finished_run_retention: Duration::from_secs(
                    parse_var(
                        "GENERATION_RUN_RETENTION_SECS",
                        defaults.finished_run_retention.as_secs(),
                    )
                    .context("GENERATION_RUN_RETENTION_SECS must be a whole number of seconds")?,
                ),
            },
        })
    }
}

/// Read and parse a variable, falling back to `default` when it is unset
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, value)),
        Err(_) => Ok(default),
    }
}
