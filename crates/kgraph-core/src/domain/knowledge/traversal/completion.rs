//! Inverse-relation completion
//!
//! Extraction from text often yields a relation in only one direction.
//! Completion walks the graph breadth-first and, for every relation
//! `head -> tail` whose tail has no relation back to `head`, asks the text
//! generator for an inverse name and inserts `tail -> head`.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::llm::{GenerationOptions, TextGenerator};

use super::super::relation::{Relation, normalize_relation_name};
use super::super::store::GraphStore;

const INVERSE_SYSTEM_PROMPT: &str = "You are an expert in linguistics and knowledge graph. \
You will be given a relation between two entities, and you will output a name for the inverse \
relation between them. Output only the relation name";

/// Outcome of a completion run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Entities reached by the traversal
    pub visited: usize,
    /// Ids of the synthesized inverse relations, in insertion order
    pub synthesized: Vec<String>,
    /// Relations skipped because their tail resolves to no entity
    pub dangling_skipped: usize,
}

impl GraphStore {
    /// Complete inverse relations across the whole graph.
    ///
    /// Every entity not reached by an earlier traversal seeds a new
    /// breadth-first pass, in registration order, so disconnected components
    /// are completed too.
    pub async fn complete_relations(
        &mut self,
        generator: &dyn TextGenerator,
    ) -> Result<CompletionReport> {
        let mut visited = HashSet::new();
        let mut report = CompletionReport::default();

        let seeds: Vec<(String, String)> = self
            .entities()
            .map(|e| (e.id.clone(), e.name.clone()))
            .collect();
        for (id, name) in seeds {
            if visited.insert(id) {
                report.visited += 1;
                self.complete_from(name, generator, &mut visited, &mut report)
                    .await?;
            }
        }

        info!(
            visited = report.visited,
            synthesized = report.synthesized.len(),
            dangling = report.dangling_skipped,
            "Relation completion finished"
        );
        Ok(report)
    }

    /// Complete inverse relations reachable from a single start entity.
    ///
    /// Components not reachable from `start` are left untouched.
    pub async fn complete_relations_from(
        &mut self,
        start: &str,
        generator: &dyn TextGenerator,
    ) -> Result<CompletionReport> {
        let (id, name) = match self.find_entity(start).await? {
            Some(entity) => (entity.id.clone(), entity.name.clone()),
            None => {
                return Err(Error::InvalidInput(format!(
                    "start entity '{}' is not in the graph",
                    start
                )));
            }
        };

        let mut visited = HashSet::from([id]);
        let mut report = CompletionReport {
            visited: 1,
            ..CompletionReport::default()
        };
        self.complete_from(name, generator, &mut visited, &mut report)
            .await?;

        info!(
            start = %start,
            visited = report.visited,
            synthesized = report.synthesized.len(),
            "Relation completion finished"
        );
        Ok(report)
    }

    /// Breadth-first pass from `start`, which is already marked visited
    async fn complete_from(
        &mut self,
        start: String,
        generator: &dyn TextGenerator,
        visited: &mut HashSet<String>,
        report: &mut CompletionReport,
    ) -> Result<()> {
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            // Inverses added below may extend this entity's list; those
            // already have their counterpart.
            let outgoing: Vec<Relation> = match self.entity(&current) {
                Some(entity) => self.outgoing(entity).cloned().collect(),
                None => continue,
            };

            for relation in outgoing {
                let (tail_id, tail_name) = match self.resolve_tail(&relation).await? {
                    Some(tail) => (tail.id.clone(), tail.name.clone()),
                    None => {
                        warn!(
                            relation_id = %relation.id,
                            tail = %relation.tail_entity_name,
                            "Relation tail is not in the graph, skipping"
                        );
                        report.dangling_skipped += 1;
                        continue;
                    }
                };

                if !self.has_relation_between(&tail_name, &relation.head_entity_name) {
                    let id = self
                        .synthesize_inverse(&relation, &tail_name, generator)
                        .await?;
                    report.synthesized.push(id);
                }

                if visited.insert(tail_id) {
                    report.visited += 1;
                    queue.push_back(tail_name);
                }
            }
        }
        Ok(())
    }

    async fn synthesize_inverse(
        &mut self,
        relation: &Relation,
        tail_name: &str,
        generator: &dyn TextGenerator,
    ) -> Result<String> {
        let prompt = format!(
            "Head Entity:{}\nTail Entity: {}\nRelation: {}",
            relation.head_entity_name, relation.tail_entity_name, relation.name
        );
        let raw = generator
            .generate(INVERSE_SYSTEM_PROMPT, &prompt, &GenerationOptions::default())
            .await?;
        if raw.trim().is_empty() {
            return Err(Error::LLMError(format!(
                "empty inverse name generated for relation '{}'",
                relation.name
            )));
        }

        let mut inverse = relation.inverse(normalize_relation_name(&raw));
        inverse.head_entity_name = tail_name.to_string();
        debug!(
            relation_id = %relation.id,
            inverse = %inverse.name,
            head = %inverse.head_entity_name,
            tail = %inverse.tail_entity_name,
            "Synthesized inverse relation"
        );
        self.add_relation(inverse).await
    }
}
