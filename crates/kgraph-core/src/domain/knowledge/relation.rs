//! Graph relations
//!
//! A relation is a directed, named edge. Its endpoints are plain entity
//! names resolved through the graph store on demand, never references.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RELATION_SUFFIX;
use super::entity::format_properties;

/// Artifact some models prepend to generated inverse names
const INVERSE_PREFIX: &str = "Inverse Relation: ";

/// A directed edge of the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Unique identifier, assigned at creation
    pub id: String,
    /// Edge label, conventionally ending in `Relation`
    pub name: String,
    /// Name of the head entity
    pub head_entity_name: String,
    /// Name of the tail entity
    pub tail_entity_name: String,
    /// Relation-scoped attributes (e.g. start/end time)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub description: String,
    /// Excerpt of the input text the edge was derived from
    #[serde(default)]
    pub source: String,
}

impl Relation {
    /// Create a new relation `head --name--> tail` with a fresh id
    pub fn new(
        name: impl Into<String>,
        head_entity_name: impl Into<String>,
        tail_entity_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            head_entity_name: head_entity_name.into(),
            tail_entity_name: tail_entity_name.into(),
            properties: BTreeMap::new(),
            description: String::new(),
            source: String::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the provenance excerpt
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Add a single property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace all properties
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// A new relation `tail --name--> head` carrying this relation's
    /// properties, description and source
    pub fn inverse(&self, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            head_entity_name: self.tail_entity_name.clone(),
            tail_entity_name: self.head_entity_name.clone(),
            properties: self.properties.clone(),
            description: self.description.clone(),
            source: self.source.clone(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Relation: (")?;
        writeln!(f, "  id: {}", self.id)?;
        writeln!(f, "  name: {}", self.name)?;
        writeln!(f, "  head: {}", self.head_entity_name)?;
        writeln!(f, "  tail: {}", self.tail_entity_name)?;
        writeln!(f, "  properties: {}", format_properties(&self.properties))?;
        writeln!(f, "  description: {}", self.description)?;
        writeln!(f, "  source: {}", self.source)?;
        write!(f, ")")
    }
}

/// Normalize a generated or extracted relation name.
///
/// Trims whitespace, strips the `Inverse Relation: ` artifact, replaces inner
/// spaces with underscores and appends `_Relation` unless the name already
/// ends in `Relation`.
pub fn normalize_relation_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix(INVERSE_PREFIX)
        .unwrap_or(trimmed)
        .trim();
    let mut name = stripped.split_whitespace().collect::<Vec<_>>().join("_");

    if !name.ends_with(RELATION_SUFFIX) {
        name.push('_');
        name.push_str(RELATION_SUFFIX);
    }
    name
}
