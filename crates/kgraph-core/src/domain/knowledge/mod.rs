//! Knowledge graph domain module
//!
//! An in-memory graph of entities and directed, named relations whose node
//! and edge identity resolves by exact name first and by embedding similarity
//! second:
//!
//! - **Graph store**: entity/relation registration with referential checks,
//!   fuzzy lookup through three persisted vector indexes
//! - **Graph completion**: synthesis of missing inverse relations
//! - **Path discovery**: directed depth-first search between two entities
//! - **Subgraph matching**: following a relation-path template taken from a
//!   question graph to candidate answers in the main graph
//! - **Snapshots**: whole-graph persistence with an explicit ID table
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ExtractionBatch ──ingest──▶ GraphStore ──▶ VectorIndex ×3   │
//! │                                  │      (entity/relation/type)│
//! │                                  ▼                            │
//! │           Traversal: complete / find_path / match template    │
//! │                    │                      │                   │
//! │                 Embedder             TextGenerator            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kgraph_core::domain::knowledge::{Entity, GraphStore, Relation};
//!
//! let mut graph = GraphStore::build("./vdb", Arc::new(client.clone()))?;
//! graph.add_entity(Entity::new("UIUC")).await?;
//! graph.add_entity(Entity::new("Barbara Wilson")).await?;
//! graph
//!     .add_relation(
//!         Relation::new("Chancellor_of_Relation", "Barbara Wilson", "UIUC")
//!             .with_property("start_time", "2015"),
//!     )
//!     .await?;
//!
//! graph.complete_relations(&client).await?;
//! let path = graph.find_path("UIUC", "Barbara Wilson").await?;
//! ```

mod entity;
mod extraction;
mod relation;
mod snapshot;
mod store;
mod traversal;

#[cfg(test)]
mod testing;

pub use entity::Entity;
pub use extraction::{ExtractedEntity, ExtractedRelation, ExtractionBatch, IngestReport};
pub use relation::{Relation, normalize_relation_name};
pub use snapshot::{GraphSnapshot, SNAPSHOT_VERSION};
pub use store::{GraphStats, GraphStore};
pub use traversal::CompletionReport;

/// Minimum cosine similarity for two names to denote the same thing
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.90;

/// Name of the unknown entity in a question graph
pub const PLACEHOLDER_ENTITY: &str = "[ENTITY]";

/// Suffix marking a name as a relation label
pub const RELATION_SUFFIX: &str = "Relation";

/// File names of the three vector indexes inside an index directory
pub const ENTITY_INDEX_FILE: &str = "entity_vdb.json";
pub const RELATION_INDEX_FILE: &str = "relation_vdb.json";
pub const TYPE_INDEX_FILE: &str = "types_vdb.json";
