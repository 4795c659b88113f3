//! Collaborator interfaces consumed by the graph core

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::Result;

/// Produces embedding vectors for text.
///
/// Implementations are expected to be deterministic for identical input and
/// to handle their own retries; an `Err` is a terminal failure.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Generates free text from a system and a user prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion; the output is returned verbatim
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String>;
}

/// Per-call generation settings; unset fields fall back to the generator's
/// configured defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Model override
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
}

impl From<&LlmConfig> for GenerationOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: Some(config.chat_model.clone()),
            temperature: Some(config.temperature),
            max_tokens: Some(config.max_tokens),
        }
    }
}

impl GenerationOptions {
    /// Use a specific model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
