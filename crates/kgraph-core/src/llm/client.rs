//! OpenAI-compatible LLM client
//!
//! Provides async HTTP access to the chat-completion and embedding endpoints
//! used by the graph core:
//! - Embeddings for entity, relation, and lookup names
//! - Chat completions for inverse-relation naming and last-hop validation
//! - Bounded retry with per-attempt timeout on transient failures

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use crate::config::{Config, LlmConfig};
use crate::error::{Error, Result};

use super::retry::RetryPolicy;
use super::traits::{Embedder, GenerationOptions, TextGenerator};
use super::types::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Message};

/// LLM client for an OpenAI-compatible API
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.config.base_url)
            .field("chat_model", &self.config.chat_model)
            .field("embedding_model", &self.config.embedding_model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    retry: Option<RetryPolicy>,
}

impl LlmClientBuilder {
    /// Set the LLM configuration
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the LlmClient
    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = match self.api_key {
            Some(key) => key,
            None => config
                .resolved_api_key()
                .map_err(|e| Error::ConfigError(e.to_string()))?
                .ok_or_else(|| Error::LLMError("API key is required".to_string()))?,
        };

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            config,
            api_key,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

impl LlmClient {
    /// Create a new LlmClient with the given configuration and API key
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::default()
            .config(config)
            .api_key(api_key)
            .build()
    }

    /// Create a client from the loaded configuration, resolving the API key
    /// from the environment
    pub fn from_config(config: &Config) -> Result<Self> {
        LlmClientBuilder::default()
            .config(config.llm.clone())
            .retry(config.retry.policy())
            .build()
    }

    /// Create a new builder for LlmClient
    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::default()
    }

    /// Default chat model
    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    /// Embedding model
    pub fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Build a chat request, filling unset options from the client config
    fn chat_request(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> ChatRequest {
        ChatRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.config.chat_model.clone()),
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        }
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<String> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status.as_u16(), &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        chat_response
            .into_content()
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }

    async fn send_embedding(&self, request: &EmbeddingRequest) -> Result<Vec<f32>> {
        debug!(model = %request.model, "Sending embedding request");

        let response = self
            .http_client
            .post(self.endpoint("embeddings"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status.as_u16(), &body));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Failed to parse response: {}", e)))?;

        embedding_response
            .into_vector()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: text.to_string(),
        };
        self.retry
            .run("embed", || self.send_embedding(&request))
            .await
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = self.chat_request(system_prompt, user_prompt, options);
        self.retry
            .run("generate", || self.send_chat(&request))
            .await
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn map_error_status(status: u16, body: &str) -> Error {
    match status {
        401 => Error::LLMError(
            "Unauthorized: Invalid API key. Set KGRAPH_API_KEY or OPENAI_API_KEY environment variable."
                .to_string(),
        ),
        429 => Error::RateLimited(extract_retry_after(body).unwrap_or(60)),
        400 => Error::LLMError(format!("Bad request: {}", body)),
        403 => Error::LLMError(format!("Forbidden: {}", body)),
        404 => Error::LLMError(format!("Model not found or endpoint unavailable: {}", body)),
        408 => Error::ServiceUnavailable(format!("Request timeout: {}", body)),
        500..=599 => Error::ServiceUnavailable(format!("Server error ({}): {}", status, body)),
        _ => Error::LLMError(format!("HTTP error {}: {}", status, body)),
    }
}

/// Extract retry-after value from an error response body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.get("error").and_then(|e| e.get("retry_after")))
        .and_then(|v| v.as_u64())
}
