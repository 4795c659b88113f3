//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::knowledge::DEFAULT_SIMILARITY_THRESHOLD;
use crate::llm::RetryPolicy;

/// KGraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Minimum cosine similarity for fuzzy identity resolution
    pub similarity_threshold: f32,
    /// Directory holding the entity, relation, and type indexes
    pub index_dir: PathBuf,
    /// Where full-graph snapshots are written
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub backoff_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            index_dir: PathBuf::from("./vdb"),
            snapshot_path: PathBuf::from("./kg_save/knowledge_graph.json"),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout_secs: 60,
            backoff_base_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Build the retry policy used at the external-service boundary
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.attempt_timeout_secs),
            Duration::from_millis(self.backoff_base_ms),
        )
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("KGRAPH_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key()
            .map(|opt| opt.map(|key| redact_key(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("kgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        if !(-1.0..=1.0).contains(&self.graph.similarity_threshold) {
            return Err(anyhow!("Similarity threshold must be between -1.0 and 1.0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // LLM settings
            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.chat_model" => Ok(self.llm.chat_model.clone()),
            "llm.embedding_model" => Ok(self.llm.embedding_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            // Graph settings
            "graph.similarity_threshold" => Ok(self.graph.similarity_threshold.to_string()),
            "graph.index_dir" => Ok(self.graph.index_dir.display().to_string()),
            "graph.snapshot_path" => Ok(self.graph.snapshot_path.display().to_string()),

            // Retry settings
            "retry.max_attempts" => Ok(self.retry.max_attempts.to_string()),
            "retry.attempt_timeout_secs" => Ok(self.retry.attempt_timeout_secs.to_string()),
            "retry.backoff_base_ms" => Ok(self.retry.backoff_base_ms.to_string()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use KGRAPH_API_KEY or OPENAI_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.base_url" => {
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.chat_model" => {
                self.llm.chat_model = value.to_string();
            }
            "llm.embedding_model" => {
                self.llm.embedding_model = value.to_string();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "graph.similarity_threshold" => {
                let threshold: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid similarity_threshold value: {}", value))?;
                if !(-1.0..=1.0).contains(&threshold) {
                    return Err(anyhow!("Similarity threshold must be between -1.0 and 1.0"));
                }
                self.graph.similarity_threshold = threshold;
            }
            "graph.index_dir" => {
                self.graph.index_dir = PathBuf::from(value);
            }
            "graph.snapshot_path" => {
                self.graph.snapshot_path = PathBuf::from(value);
            }

            "retry.max_attempts" => {
                let attempts: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_attempts value: {}", value))?;
                if attempts == 0 {
                    return Err(anyhow!("retry.max_attempts must be at least 1"));
                }
                self.retry.max_attempts = attempts;
            }
            "retry.attempt_timeout_secs" => {
                self.retry.attempt_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid attempt_timeout_secs value: {}", value))?;
            }
            "retry.backoff_base_ms" => {
                self.retry.backoff_base_ms = value
                    .parse()
                    .with_context(|| format!("Invalid backoff_base_ms value: {}", value))?;
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the KGRAPH_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!("Unknown configuration key: {}", key));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.base_url",
            "llm.chat_model",
            "llm.embedding_model",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "graph.similarity_threshold",
            "graph.index_dir",
            "graph.snapshot_path",
            "retry.max_attempts",
            "retry.attempt_timeout_secs",
            "retry.backoff_base_ms",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

/// Mask all but the last four characters of an API key
fn redact_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let suffix: String = key.chars().skip(count - 4).collect();
    format!("***{}", suffix)
}
