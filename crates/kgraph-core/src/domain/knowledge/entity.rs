//! Graph entities
//!
//! An entity is a node keyed by its canonical name. Relations for which the
//! entity is the head are tracked by id in `outgoing_relations`, in insertion
//! order; only the graph store appends to that list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node of the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier, assigned at creation
    pub id: String,
    /// Canonical name, unique within a graph
    pub name: String,
    /// Open-schema attributes
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Classification labels
    #[serde(default)]
    pub types: BTreeSet<String>,
    /// Free-text description, extended on duplicate insertion
    #[serde(default)]
    pub description: String,
    /// Ids of relations whose head is this entity
    #[serde(default)]
    pub(crate) outgoing_relations: Vec<String>,
}

impl Entity {
    /// Create a new entity with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            properties: BTreeMap::new(),
            types: BTreeSet::new(),
            description: String::new(),
            outgoing_relations: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
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

    /// Add classification labels
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Ids of the relations leaving this entity, in insertion order
    pub fn outgoing_relations(&self) -> &[String] {
        &self.outgoing_relations
    }

    /// Append to the description, space-joined
    pub(crate) fn merge_description(&mut self, description: &str) {
        if description.is_empty() {
            return;
        }
        if !self.description.is_empty() {
            self.description.push(' ');
        }
        self.description.push_str(description);
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Entity: (")?;
        writeln!(f, "  id: {}", self.id)?;
        writeln!(f, "  name: {}", self.name)?;
        writeln!(f, "  properties: {}", format_properties(&self.properties))?;
        writeln!(f, "  description: {}", self.description)?;
        let types: Vec<&str> = self.types.iter().map(String::as_str).collect();
        writeln!(f, "  types: [{}]", types.join(", "))?;
        writeln!(f, "  relations: {}", self.outgoing_relations.len())?;
        write!(f, ")")
    }
}

/// Render a property map as `{key: value, ...}`
pub(crate) fn format_properties(properties: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = properties
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}
