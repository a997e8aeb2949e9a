use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::circuit_breaker::{create_generation_circuit_breaker, GenerationBreaker};
use crate::config::Config;
use crate::errors::AppError;

/// A single bounded text-generation call.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    breaker: GenerationBreaker,
}

impl OpenAiChatClient {
    /// Creates a new `OpenAiChatClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`.
    /// * `api_key` - Bearer token.
    /// * `model` - Model name sent with every request.
    /// * `timeout` - Deadline for the whole HTTP exchange.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create generation client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            breaker: create_generation_circuit_breaker(),
        })
    }

    /// Builds the client from configuration; `None` when no API key is set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        match Self::new(
            config.openai_base_url.clone(),
            api_key,
            config.openai_model.clone(),
            Duration::from_secs(config.ai_timeout_secs),
        ) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Failed to initialize generation client: {}", e);
                None
            }
        }
    }

    async fn send(&self, system: &str, prompt: &str) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        tracing::debug!("Calling generation endpoint {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Generation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Generation endpoint returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AppError::MalformedResponse(format!("Failed to parse generation response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::MalformedResponse("Generation returned no content".into()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AppError> {
        match self.breaker.call(self.send(system, prompt)).await {
            Ok(text) => Ok(text),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "Generation circuit open, call rejected".to_string(),
            )),
        }
    }
}
