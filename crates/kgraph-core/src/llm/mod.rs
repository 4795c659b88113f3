//! LLM integration
//!
//! The graph core talks to language models only through the [`Embedder`]
//! and [`TextGenerator`] traits. [`LlmClient`] implements both against an
//! OpenAI-compatible API; [`HashEmbedder`] is a deterministic offline
//! embedder.

mod client;
mod local;
mod retry;
mod traits;
pub mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use local::{DEFAULT_HASH_DIMENSIONS, HashEmbedder};
pub use retry::RetryPolicy;
pub use traits::{Embedder, GenerationOptions, TextGenerator};
