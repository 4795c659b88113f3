//! Whole-graph snapshots
//!
//! A snapshot is a versioned JSON document holding every entity, relation,
//! type label and index vector of a graph. Relations refer to entities by
//! name and entities to relations by id; restore rebuilds the lookup tables
//! from those keys and refuses documents whose references do not line up.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::index::{VectorDocument, VectorIndex, write_json_atomic};
use crate::llm::Embedder;

use super::entity::Entity;
use super::relation::Relation;
use super::store::GraphStore;
use super::{ENTITY_INDEX_FILE, RELATION_INDEX_FILE, TYPE_INDEX_FILE};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a whole graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub similarity_threshold: f32,
    /// Entities in registration order, with their outgoing relation ids
    pub entities: Vec<Entity>,
    /// Relations in insertion order
    pub relations: Vec<Relation>,
    pub types: BTreeSet<String>,
    pub entity_vectors: VectorDocument,
    pub relation_vectors: VectorDocument,
    pub type_vectors: VectorDocument,
}

impl GraphSnapshot {
    /// Read a snapshot file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let snapshot: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::SnapshotCorrupted(format!("{}: {}", path.display(), e)))?;
        Ok(snapshot)
    }

    /// Write the snapshot, replacing any previous file atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(path.as_ref(), self)
    }

    /// Check that every cross-reference in the document resolves
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return corrupted(format!(
                "unsupported version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            ));
        }

        let mut names = HashSet::new();
        let mut entity_ids = HashSet::new();
        for entity in &self.entities {
            if !names.insert(entity.name.as_str()) {
                return corrupted(format!("duplicate entity name '{}'", entity.name));
            }
            if !entity_ids.insert(entity.id.as_str()) {
                return corrupted(format!("duplicate entity id '{}'", entity.id));
            }
            if !self.entity_vectors.contains_key(&entity.id) {
                return corrupted(format!("entity '{}' has no vector", entity.name));
            }
        }

        let mut relations: HashMap<&str, &Relation> = HashMap::new();
        for relation in &self.relations {
            if relations.insert(relation.id.as_str(), relation).is_some() {
                return corrupted(format!("duplicate relation id '{}'", relation.id));
            }
            if !names.contains(relation.head_entity_name.as_str()) {
                return corrupted(format!(
                    "relation '{}' has unknown head '{}'",
                    relation.id, relation.head_entity_name
                ));
            }
            if !self.relation_vectors.contains_key(&relation.id) {
                return corrupted(format!("relation '{}' has no vector", relation.id));
            }
        }

        let mut owned = HashSet::new();
        for entity in &self.entities {
            for relation_id in &entity.outgoing_relations {
                let Some(relation) = relations.get(relation_id.as_str()) else {
                    return corrupted(format!(
                        "entity '{}' lists unknown relation '{}'",
                        entity.name, relation_id
                    ));
                };
                if relation.head_entity_name != entity.name {
                    return corrupted(format!(
                        "relation '{}' is listed by '{}' but its head is '{}'",
                        relation_id, entity.name, relation.head_entity_name
                    ));
                }
                if !owned.insert(relation_id.as_str()) {
                    return corrupted(format!("relation '{}' is listed twice", relation_id));
                }
            }
        }
        if owned.len() != relations.len() {
            return corrupted(format!(
                "{} relations are not listed by their head entity",
                relations.len() - owned.len()
            ));
        }

        Ok(())
    }
}

fn corrupted<T>(reason: String) -> Result<T> {
    Err(Error::SnapshotCorrupted(reason))
}

impl GraphStore {
    /// Capture the whole graph
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            similarity_threshold: self.similarity_threshold,
            entities: self.entities().cloned().collect(),
            relations: self.relations().cloned().collect(),
            types: self.types.clone(),
            entity_vectors: self.entity_index.document().clone(),
            relation_vectors: self.relation_index.document().clone(),
            type_vectors: self.type_index.document().clone(),
        }
    }

    /// Write a snapshot of the graph to `path`
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot();
        snapshot.save(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            entities = snapshot.entities.len(),
            relations = snapshot.relations.len(),
            "Saved graph snapshot"
        );
        Ok(())
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// The indexes are written under `index_dir` when given, otherwise kept
    /// in memory.
    pub fn restore(
        snapshot: GraphSnapshot,
        index_dir: Option<&Path>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        snapshot.validate()?;

        let index_path = |file: &str| index_dir.map(|dir| dir.join(file));
        let entity_index =
            VectorIndex::from_document(index_path(ENTITY_INDEX_FILE), snapshot.entity_vectors)?;
        let relation_index =
            VectorIndex::from_document(index_path(RELATION_INDEX_FILE), snapshot.relation_vectors)?;
        let type_index =
            VectorIndex::from_document(index_path(TYPE_INDEX_FILE), snapshot.type_vectors)?;

        let mut graph = Self::with_indexes(entity_index, relation_index, type_index, embedder)
            .with_similarity_threshold(snapshot.similarity_threshold);

        graph.types = snapshot.types;
        for entity in snapshot.entities {
            graph.types.extend(entity.types.iter().cloned());
            graph.entity_ids.insert(entity.id.clone(), entity.name.clone());
            graph.entity_order.push(entity.name.clone());
            graph.entities.insert(entity.name.clone(), entity);
        }
        for relation in snapshot.relations {
            graph.relation_order.push(relation.id.clone());
            graph.relations.insert(relation.id.clone(), relation);
        }

        info!(
            entities = graph.entity_count(),
            relations = graph.relation_count(),
            "Restored graph snapshot"
        );
        Ok(graph)
    }

    /// Load and restore a snapshot file
    pub fn load_snapshot(
        path: impl AsRef<Path>,
        index_dir: Option<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let snapshot = GraphSnapshot::load(path)?;
        Self::restore(snapshot, index_dir.as_deref(), embedder)
    }
}
