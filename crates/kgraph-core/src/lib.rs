//! KGraph Core Library
//!
//! This crate provides the core functionality for KGraph, including:
//! - Typed knowledge graph of entities and named, directed relations
//! - Fuzzy identity resolution over embedding vectors (cosine similarity)
//! - Persisted vector indexes for entities, relations, and types
//! - Graph completion with synthesized inverse relations
//! - Path discovery and template-guided subgraph matching
//! - LLM integration (embeddings and text generation) with bounded retry

pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod llm;
pub mod similarity;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::knowledge::{
        CompletionReport, Entity, ExtractionBatch, GraphSnapshot, GraphStore, Relation,
    };
    pub use crate::error::{Error, Result};
    pub use crate::llm::{Embedder, GenerationOptions, LlmClient, RetryPolicy, TextGenerator};
}
