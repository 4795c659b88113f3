//! Error types for KGraph

use thiserror::Error;

/// Result type alias using KGraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// KGraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Head entity '{0}' of relation is not in the graph. Add the entity before its relations.")]
    HeadEntityNotFound(String),

    #[error("Source entity '{0}' of the question is not present in the knowledge graph.")]
    SourceEntityNotFound(String),

    #[error("Invalid query path: {0}")]
    InvalidPath(String),

    #[error("Question shape not supported: {0}")]
    QuestionShape(String),

    // Vector index errors (E100-E199)
    #[error("Vector '{0}' not found in index.")]
    VectorNotFound(String),

    #[error("Vector dimension mismatch: expected {0}, got {1}")]
    DimensionMismatch(usize, usize),

    // External service errors (E200-E299)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `KGRAPH_API_KEY`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("External call '{0}' timed out after {1} seconds")]
    ExternalTimeout(String, u64),

    #[error("External call '{operation}' failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<Error>,
    },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    // Persistence errors (E300-E399)
    #[error("Snapshot is corrupted: {0}")]
    SnapshotCorrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::HeadEntityNotFound(_) => "E001",
            Self::SourceEntityNotFound(_) => "E002",
            Self::InvalidPath(_) => "E003",
            Self::QuestionShape(_) => "E004",
            Self::VectorNotFound(_) => "E100",
            Self::DimensionMismatch(..) => "E101",
            Self::NetworkError(_) => "E200",
            Self::LLMError(_) => "E201",
            Self::RateLimited(_) => "E202",
            Self::ServiceUnavailable(_) => "E203",
            Self::ExternalTimeout(..) => "E204",
            Self::RetriesExhausted { .. } => "E205",
            Self::EmbeddingFailed(_) => "E206",
            Self::SnapshotCorrupted(_) => "E300",
            Self::Serialization(_) => "E301",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::HeadEntityNotFound(name) => Some(format!("add entity '{}' first", name)),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("Set KGRAPH_API_KEY or OPENAI_API_KEY".to_string()),
            Self::RetriesExhausted { .. } => {
                Some("Raise retry.max_attempts or retry.attempt_timeout_secs".to_string())
            }
            Self::SnapshotCorrupted(_) => Some("Rebuild the graph from its sources".to_string()),
            _ => None,
        }
    }

    /// Whether the failure is transient and the external call may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_)
            | Self::RateLimited(_)
            | Self::ServiceUnavailable(_)
            | Self::ExternalTimeout(..)
            | Self::EmbeddingFailed(_) => true,
            _ => false,
        }
    }

    /// Server-suggested wait before the next attempt, in seconds
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited(secs) => Some(*secs),
            _ => None,
        }
    }
}
