//! Ollama client - OpenAI-compatible chat completions
//!
//! Works against any server exposing `POST {base}/chat/completions`. The
//! request timeout is set on the HTTP client; an expired request surfaces as
//! an ordinary client error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::application::ports::outbound::{
    ChatMessage, LlmPort, LlmRequest, LlmResponse, MessageRole,
};

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server error: HTTP {status} - {body}")]
    Server { status: u16, body: String },
    #[error("Response contained no choices")]
    NoChoices,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

/// Client for an OpenAI-compatible chat endpoint
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Prepend the system prompt as a system message
fn build_messages(request: LlmRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system_prompt) = request.system_prompt {
        messages.push(ChatMessage {
            role: MessageRole::System,
            content: system_prompt,
        });
    }
    messages.extend(request.messages);
    messages
}

#[async_trait]
impl LlmPort for OllamaClient {
    type Error = LlmClientError;

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, Self::Error> {
        let temperature = request.temperature;
        let max_tokens = request.max_tokens;
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: build_messages(request),
            temperature,
            max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(self.completions_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(LlmClientError::NoChoices)?;
        let tokens_used = completion.usage.map(|u| u.total_tokens).unwrap_or(0);
        debug!(tokens_used, "Chat completion finished");

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: if completion.model.is_empty() {
                self.model.clone()
            } else {
                completion.model
            },
            tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_becomes_first_message() {
        let request = LlmRequest::new(vec![ChatMessage::user("hello")]).with_system_prompt("be brief");

        let messages = build_messages(request);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[1].role, MessageRole::User);
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatCompletionRequest {
            model: "llama3.2",
            messages: vec![ChatMessage::user("hi")],
            temperature: Some(0.5),
            max_tokens: None,
            stream: false,
        };

        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.5);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_with_null_content_decodes() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;

        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();

        assert!(response.choices[0].message.content.is_none());
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/v1/", "llama3.2", Duration::from_secs(5)).unwrap();
        assert_eq!(client.completions_url(), "http://localhost:11434/v1/chat/completions");
    }
}
