//! Graph store
//!
//! Owns every entity and relation of a graph, enforces referential
//! integrity on insertion, and resolves names to graph elements by exact
//! match first and embedding similarity second. Entity, relation and type
//! embeddings live in three [`VectorIndex`]es.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::llm::Embedder;
use crate::similarity::cosine_similarity;

use super::entity::Entity;
use super::relation::Relation;
use super::{
    DEFAULT_SIMILARITY_THRESHOLD, ENTITY_INDEX_FILE, RELATION_INDEX_FILE, TYPE_INDEX_FILE,
};

/// Counts describing a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: usize,
    pub relations: usize,
    pub types: usize,
    pub entity_vectors: usize,
    pub relation_vectors: usize,
    pub type_vectors: usize,
    /// Relations whose tail name is not a registered entity
    pub dangling_relations: usize,
}

/// In-memory knowledge graph with persisted vector indexes
pub struct GraphStore {
    /// Entities by name
    pub(super) entities: HashMap<String, Entity>,
    /// Entity names in registration order
    pub(super) entity_order: Vec<String>,
    /// Entity id to name
    pub(super) entity_ids: HashMap<String, String>,
    /// Relations by id
    pub(super) relations: HashMap<String, Relation>,
    /// Relation ids in insertion order
    pub(super) relation_order: Vec<String>,
    pub(super) types: BTreeSet<String>,
    pub(super) entity_index: VectorIndex,
    pub(super) relation_index: VectorIndex,
    pub(super) type_index: VectorIndex,
    pub(super) embedder: Arc<dyn Embedder>,
    pub(super) similarity_threshold: f32,
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("entities", &self.entities.len())
            .field("relations", &self.relations.len())
            .field("types", &self.types.len())
            .field("similarity_threshold", &self.similarity_threshold)
            .finish()
    }
}

impl GraphStore {
    /// Create an empty graph whose indexes are persisted under `index_dir`.
    ///
    /// Existing index files in the directory are truncated.
    pub fn build(index_dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dir = index_dir.as_ref();
        info!(index_dir = %dir.display(), "Building empty knowledge graph");

        Ok(Self::with_indexes(
            VectorIndex::create(dir.join(ENTITY_INDEX_FILE))?,
            VectorIndex::create(dir.join(RELATION_INDEX_FILE))?,
            VectorIndex::create(dir.join(TYPE_INDEX_FILE))?,
            embedder,
        ))
    }

    /// Create an empty graph at the configured index directory and threshold
    pub fn from_config(config: &GraphConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::build(&config.index_dir, embedder)?
            .with_similarity_threshold(config.similarity_threshold))
    }

    /// Create an empty graph whose indexes are never written to disk
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_indexes(
            VectorIndex::in_memory(),
            VectorIndex::in_memory(),
            VectorIndex::in_memory(),
            embedder,
        )
    }

    pub(super) fn with_indexes(
        entity_index: VectorIndex,
        relation_index: VectorIndex,
        type_index: VectorIndex,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            entities: HashMap::new(),
            entity_order: Vec::new(),
            entity_ids: HashMap::new(),
            relations: HashMap::new(),
            relation_order: Vec::new(),
            types: BTreeSet::new(),
            entity_index,
            relation_index,
            type_index,
            embedder,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Override the similarity threshold used for every fuzzy match
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Whether `score` is close enough to denote the same thing
    pub(super) fn is_match(&self, score: f32) -> bool {
        score >= self.similarity_threshold
    }

    // ========== Insertion ==========

    /// Add an entity, returning the id of the stored entity.
    ///
    /// A new name is embedded and indexed. A known name only has the incoming
    /// description appended to the stored one. Types are unioned into the
    /// graph's type set either way.
    pub async fn add_entity(&mut self, mut entity: Entity) -> Result<String> {
        // All embeddings are computed before any index changes.
        if self.entities.contains_key(&entity.name) {
            let type_vectors = self.embed_new_types(&entity.types).await?;
            self.register_types(type_vectors)?;
        }
        if let Some(existing) = self.entities.get_mut(&entity.name) {
            existing.merge_description(&entity.description);
            let id = existing.id.clone();
            debug!(entity_id = %id, name = %entity.name, "Merged duplicate entity");
            return Ok(id);
        }

        if self.entity_ids.contains_key(&entity.id) {
            return Err(Error::InvalidInput(format!(
                "entity id '{}' is already registered under another name",
                entity.id
            )));
        }

        let vector = self.embedder.embed(&entity.name).await?;
        let type_vectors = self.embed_new_types(&entity.types).await?;

        self.entity_index.insert(entity.id.clone(), vector)?;
        if let Err(e) = self.register_types(type_vectors) {
            self.entity_index.remove(&entity.id)?;
            return Err(e);
        }

        entity.outgoing_relations.clear();
        let id = entity.id.clone();
        debug!(entity_id = %id, name = %entity.name, "Added entity");

        self.entity_ids.insert(id.clone(), entity.name.clone());
        self.entity_order.push(entity.name.clone());
        self.entities.insert(entity.name.clone(), entity);
        Ok(id)
    }

    /// Add a relation to the graph and to its head entity's outgoing list.
    ///
    /// The head entity must already exist. The tail is not checked; dangling
    /// tails surface as lookup misses during traversal. Re-adding a relation
    /// with a known id is a no-op.
    pub async fn add_relation(&mut self, relation: Relation) -> Result<String> {
        if !self.entities.contains_key(&relation.head_entity_name) {
            return Err(Error::HeadEntityNotFound(relation.head_entity_name));
        }
        if self.relations.contains_key(&relation.id) {
            debug!(relation_id = %relation.id, "Relation already registered");
            return Ok(relation.id);
        }

        let vector = self.embedder.embed(&relation.name).await?;
        self.relation_index.insert(relation.id.clone(), vector)?;

        let id = relation.id.clone();
        if let Some(head) = self.entities.get_mut(&relation.head_entity_name) {
            head.outgoing_relations.push(id.clone());
        }
        debug!(
            relation_id = %id,
            name = %relation.name,
            head = %relation.head_entity_name,
            tail = %relation.tail_entity_name,
            "Added relation"
        );

        self.relation_order.push(id.clone());
        self.relations.insert(id.clone(), relation);
        Ok(id)
    }

    /// Embeddings of the labels in `types` not yet known to the graph
    async fn embed_new_types(&self, types: &BTreeSet<String>) -> Result<Vec<(String, Vec<f32>)>> {
        let mut vectors = Vec::new();
        for label in types.iter().filter(|label| !self.types.contains(*label)) {
            vectors.push((label.clone(), self.embedder.embed(label).await?));
        }
        Ok(vectors)
    }

    /// Index new type labels; labels indexed before a failure are withdrawn
    fn register_types(&mut self, vectors: Vec<(String, Vec<f32>)>) -> Result<()> {
        let mut indexed: Vec<String> = Vec::new();
        for (label, vector) in vectors {
            if let Err(e) = self.type_index.insert(label.clone(), vector) {
                for label in &indexed {
                    self.type_index.remove(label)?;
                }
                return Err(e);
            }
            indexed.push(label);
        }
        self.types.extend(indexed);
        Ok(())
    }

    // ========== Lookup ==========

    /// Resolve a name to an entity.
    ///
    /// An exact name hit always wins. Otherwise the name is embedded and the
    /// nearest indexed entity is accepted if its similarity reaches the
    /// threshold.
    pub async fn find_entity(&self, name: &str) -> Result<Option<&Entity>> {
        if let Some(entity) = self.entities.get(name) {
            return Ok(Some(entity));
        }
        if self.entity_index.is_empty() {
            return Ok(None);
        }

        let vector = self.embedder.embed(name).await?;
        Ok(self.nearest_entity(&vector, name))
    }

    /// Nearest entity to `vector` if it clears the threshold
    pub(super) fn nearest_entity(&self, vector: &[f32], query: &str) -> Option<&Entity> {
        let hit = self.entity_index.query_nearest(vector, 1).into_iter().next()?;
        if !self.is_match(hit.score) {
            debug!(query, nearest = %hit.id, score = hit.score, "No entity above threshold");
            return None;
        }

        let entity = self
            .entity_ids
            .get(&hit.id)
            .and_then(|name| self.entities.get(name));
        match entity {
            Some(entity) => {
                debug!(query, name = %entity.name, score = hit.score, "Resolved entity by similarity");
                Some(entity)
            }
            None => {
                warn!(vector_id = %hit.id, "Indexed vector has no entity");
                None
            }
        }
    }

    /// Find the relation `head --relation_name--> tail`.
    ///
    /// The head resolves as in [`GraphStore::find_entity`]. Its outgoing
    /// relations are scanned in insertion order; a candidate matches when its
    /// tail equals `tail_name` or is similar enough to it, and its name
    /// equals `relation_name` or is similar enough to it. The first match is
    /// returned.
    pub async fn find_relation(
        &self,
        head_name: &str,
        tail_name: &str,
        relation_name: &str,
    ) -> Result<Option<&Relation>> {
        let Some(head) = self.find_entity(head_name).await? else {
            return Ok(None);
        };

        let mut tail_vector: Option<Vec<f32>> = None;
        let mut name_vector: Option<Vec<f32>> = None;

        for relation_id in &head.outgoing_relations {
            let Some(relation) = self.relations.get(relation_id) else {
                continue;
            };

            let tail_matches = if relation.tail_entity_name == tail_name {
                true
            } else if let Some(tail) = self.entities.get(&relation.tail_entity_name) {
                let query = self.embed_cached(&mut tail_vector, tail_name).await?;
                let stored = self.entity_index.query_by_id(&tail.id)?;
                self.is_match(cosine_similarity(query, stored))
            } else {
                false
            };
            if !tail_matches {
                continue;
            }

            let name_matches = if relation.name == relation_name {
                true
            } else {
                let query = self.embed_cached(&mut name_vector, relation_name).await?;
                let stored = self.relation_index.query_by_id(&relation.id)?;
                self.is_match(cosine_similarity(query, stored))
            };
            if name_matches {
                return Ok(Some(relation));
            }
        }

        Ok(None)
    }

    /// Resolve a type label exactly or by similarity
    pub async fn find_type(&self, label: &str) -> Result<Option<&str>> {
        if let Some(found) = self.types.get(label) {
            return Ok(Some(found.as_str()));
        }
        if self.type_index.is_empty() {
            return Ok(None);
        }

        let vector = self.embedder.embed(label).await?;
        let found = self
            .type_index
            .query_nearest(&vector, 1)
            .into_iter()
            .next()
            .filter(|hit| self.is_match(hit.score))
            .and_then(|hit| self.types.get(&hit.id))
            .map(String::as_str);
        Ok(found)
    }

    async fn embed_cached<'a>(
        &self,
        cache: &'a mut Option<Vec<f32>>,
        text: &str,
    ) -> Result<&'a [f32]> {
        if cache.is_none() {
            *cache = Some(self.embedder.embed(text).await?);
        }
        Ok(cache.as_deref().unwrap_or(&[]))
    }

    /// Resolve the tail of `relation`, exactly or by similarity
    pub(super) async fn resolve_tail(&self, relation: &Relation) -> Result<Option<&Entity>> {
        self.find_entity(&relation.tail_entity_name).await
    }

    // ========== Accessors ==========

    /// Entity with exactly this name
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Entity with this id
    pub fn entity_by_id(&self, id: &str) -> Option<&Entity> {
        self.entity_ids.get(id).and_then(|name| self.entities.get(name))
    }

    /// Relation with this id
    pub fn relation(&self, id: &str) -> Option<&Relation> {
        self.relations.get(id)
    }

    /// Entities in registration order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entity_order
            .iter()
            .filter_map(|name| self.entities.get(name))
    }

    /// Relations in insertion order
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relation_order
            .iter()
            .filter_map(|id| self.relations.get(id))
    }

    /// Relations leaving `entity`, in insertion order
    pub fn outgoing<'a>(&'a self, entity: &'a Entity) -> impl Iterator<Item = &'a Relation> + 'a {
        entity
            .outgoing_relations
            .iter()
            .filter_map(|id| self.relations.get(id))
    }

    /// Whether `head` has any relation whose tail is exactly `tail`
    pub fn has_relation_between(&self, head: &str, tail: &str) -> bool {
        self.entities
            .get(head)
            .map(|entity| self.outgoing(entity).any(|r| r.tail_entity_name == tail))
            .unwrap_or(false)
    }

    /// Type labels observed so far
    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    pub fn contains_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Stored embedding of the entity named `name`
    pub fn entity_vector(&self, name: &str) -> Result<&[f32]> {
        let entity = self
            .entities
            .get(name)
            .ok_or_else(|| Error::VectorNotFound(name.to_string()))?;
        self.entity_index.query_by_id(&entity.id)
    }

    /// Stored embedding of the relation with id `id`
    pub fn relation_vector(&self, id: &str) -> Result<&[f32]> {
        self.relation_index.query_by_id(id)
    }

    pub fn entity_index(&self) -> &VectorIndex {
        &self.entity_index
    }

    pub fn relation_index(&self) -> &VectorIndex {
        &self.relation_index
    }

    pub fn type_index(&self) -> &VectorIndex {
        &self.type_index
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            entities: self.entities.len(),
            relations: self.relations.len(),
            types: self.types.len(),
            entity_vectors: self.entity_index.len(),
            relation_vectors: self.relation_index.len(),
            type_vectors: self.type_index.len(),
            dangling_relations: self
                .relations
                .values()
                .filter(|r| !self.entities.contains_key(&r.tail_entity_name))
                .count(),
        }
    }
}

impl fmt::Display for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Knowledge Graph:")?;
        writeln!(f)?;
        writeln!(f, "Entities:")?;
        for entity in self.entities() {
            writeln!(f, "{}", entity)?;
        }
        writeln!(f)?;
        writeln!(f, "Relations:")?;
        for relation in self.relations() {
            writeln!(f, "{}", relation)?;
        }
        writeln!(f)?;
        writeln!(f, "Types:")?;
        let types: Vec<&str> = self.types.iter().map(String::as_str).collect();
        writeln!(f, "[{}]", types.join(", "))
    }
}
