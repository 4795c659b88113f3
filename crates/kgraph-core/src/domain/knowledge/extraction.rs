//! Extraction-batch ingestion
//!
//! Entity and relation extraction from text happens outside this crate, in
//! a language model. Its JSON output is parsed leniently into an
//! [`ExtractionBatch`] and ingested into a graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::entity::Entity;
use super::relation::{Relation, normalize_relation_name};
use super::store::GraphStore;

/// Entities and relations extracted from one text chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionBatch {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

/// An extracted entity; everything but the name is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, alias = "attributes", alias = "data_properties")]
    pub properties: BTreeMap<String, String>,
}

/// An extracted relation `head --name--> tail`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    #[serde(alias = "relation")]
    pub name: String,
    #[serde(alias = "head_entity", alias = "head_entity_name")]
    pub head: String,
    #[serde(alias = "tail_entity", alias = "tail_entity_name")]
    pub tail: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, alias = "attributes", alias = "data_properties")]
    pub properties: BTreeMap<String, String>,
}

impl From<ExtractedEntity> for Entity {
    fn from(extracted: ExtractedEntity) -> Self {
        Entity::new(extracted.name.trim())
            .with_description(extracted.description)
            .with_types(extracted.types)
            .with_properties(extracted.properties)
    }
}

impl From<ExtractedRelation> for Relation {
    fn from(extracted: ExtractedRelation) -> Self {
        Relation::new(
            normalize_relation_name(&extracted.name),
            extracted.head.trim(),
            extracted.tail.trim(),
        )
        .with_description(extracted.description)
        .with_source(extracted.source)
        .with_properties(extracted.properties)
    }
}

impl ExtractionBatch {
    /// Parse model output, tolerating Markdown code fences and prose around
    /// the JSON object
    pub fn from_llm_output(response: &str) -> Result<Self> {
        let json = extract_json_from_response(response);
        serde_json::from_str(&json).map_err(|e| {
            Error::InvalidInput(format!("extraction output is not a valid batch: {}", e))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// Counts from one ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub entities_added: usize,
    pub entities_merged: usize,
    pub relations_added: usize,
    /// Relations dropped because their head entity is unknown
    pub relations_skipped: usize,
}

impl GraphStore {
    /// Add every entity of `batch`, then every relation.
    ///
    /// Entities with a blank name are ignored. A relation whose head is not
    /// in the graph is skipped with a warning; any other failure aborts.
    pub async fn ingest(&mut self, batch: ExtractionBatch) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for extracted in batch.entities {
            if extracted.name.trim().is_empty() {
                warn!("Skipping extracted entity without a name");
                continue;
            }
            let entity = Entity::from(extracted);
            if self.contains_entity(&entity.name) {
                report.entities_merged += 1;
            } else {
                report.entities_added += 1;
            }
            self.add_entity(entity).await?;
        }

        for extracted in batch.relations {
            match self.add_relation(Relation::from(extracted)).await {
                Ok(_) => report.relations_added += 1,
                Err(Error::HeadEntityNotFound(head)) => {
                    warn!(head = %head, "Skipping relation with unknown head entity");
                    report.relations_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            entities_added = report.entities_added,
            entities_merged = report.entities_merged,
            relations_added = report.relations_added,
            relations_skipped = report.relations_skipped,
            "Ingested extraction batch"
        );
        Ok(report)
    }
}

/// Extract a JSON object from an LLM response, which may wrap it in
/// Markdown code blocks or prose
fn extract_json_from_response(response: &str) -> String {
    // Try to find JSON in code blocks first
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    // Try to find JSON in generic code blocks
    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    // Try to find raw JSON object
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    response.trim().to_string()
}
