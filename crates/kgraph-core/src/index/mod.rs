//! Persisted vector index
//!
//! A mapping from opaque identifiers to embedding vectors with k-nearest
//! neighbour lookup by cosine similarity. Each index is stored as one JSON
//! document (`{"<id>": [f32, ...], ...}`) that is rewritten on every insert.
//!
//! The index is owned by a single writer; `insert` takes `&mut self`, so
//! concurrent mutation has to go through whatever owns the index.

mod file;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::similarity::cosine_similarity;

pub use file::VectorDocument;
pub(crate) use file::write_json_atomic;

/// A nearest-neighbour result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Identifier of the stored vector
    pub id: String,
    /// Cosine similarity with the query vector
    pub score: f32,
}

/// Vector index backed by a whole-document JSON file (or memory only)
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    path: Option<PathBuf>,
    vectors: VectorDocument,
}

impl VectorIndex {
    /// Create an index that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create an empty index at `path`, truncating any previous content
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let index = Self {
            path: Some(path.into()),
            vectors: VectorDocument::new(),
        };
        index.persist()?;
        Ok(index)
    }

    /// Open an existing index at `path` (missing file means empty)
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let vectors = file::load_document(&path)?;
        debug!(path = %path.display(), entries = vectors.len(), "Opened vector index");
        Self::check_dimensions(&vectors)?;
        Ok(Self {
            path: Some(path),
            vectors,
        })
    }

    /// Build an index from known contents and write it to `path` if given
    pub fn from_document(path: Option<PathBuf>, vectors: VectorDocument) -> Result<Self> {
        Self::check_dimensions(&vectors)?;
        let index = Self { path, vectors };
        index.persist()?;
        Ok(index)
    }

    /// Record `vector` under `id`, replacing any previous vector for that id
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidInput("cannot index an empty vector".into()));
        }
        let id = id.into();
        if let Some(expected) = self.dimensions().filter(|d| *d != vector.len()) {
            return Err(Error::DimensionMismatch(expected, vector.len()));
        }

        let previous = self.vectors.insert(id.clone(), vector);
        if let Err(e) = self.persist() {
            match previous {
                Some(vector) => self.vectors.insert(id, vector),
                None => self.vectors.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Drop the vector stored under `id`, returning it if present
    pub fn remove(&mut self, id: &str) -> Result<Option<Vec<f32>>> {
        let Some(vector) = self.vectors.remove(id) else {
            return Ok(None);
        };
        if let Err(e) = self.persist() {
            self.vectors.insert(id.to_string(), vector);
            return Err(e);
        }
        Ok(Some(vector))
    }

    /// Up to `k` stored ids ordered by descending similarity to `vector`.
    ///
    /// Ties keep the index's iteration order. An empty index yields an empty
    /// result.
    pub fn query_nearest(&self, vector: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .map(|(id, stored)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(vector, stored),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }

    /// The vector stored under `id`
    pub fn query_by_id(&self, id: &str) -> Result<&[f32]> {
        self.vectors
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::VectorNotFound(id.to_string()))
    }

    /// Check whether `id` is indexed
    pub fn contains(&self, id: &str) -> bool {
        self.vectors.contains_key(id)
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality of the stored vectors, if any are stored
    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.values().next().map(Vec::len)
    }

    /// All stored entries
    pub fn document(&self) -> &VectorDocument {
        &self.vectors
    }

    /// Backing file, if persisted
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> Result<()> {
        match &self.path {
            Some(path) => file::write_document(path, &self.vectors),
            None => Ok(()),
        }
    }

    fn check_dimensions(vectors: &VectorDocument) -> Result<()> {
        let mut lengths = vectors.values().map(Vec::len);
        if let Some(first) = lengths.next() {
            if let Some(other) = lengths.find(|len| *len != first) {
                return Err(Error::DimensionMismatch(first, other));
            }
        }
        Ok(())
    }
}
