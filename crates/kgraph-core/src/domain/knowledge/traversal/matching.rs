//! Template-guided subgraph matching
//!
//! A question such as "Who was chancellor of UIUC in 2015?" is turned by the
//! caller into a small question graph in which the unknown is the
//! placeholder entity `[ENTITY]`. The path from a known (anchor) entity to
//! the placeholder is a template: following relations with the same meaning
//! through the main graph leads to candidate answers.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::llm::{GenerationOptions, TextGenerator};
use crate::similarity::cosine_similarity;

use super::super::PLACEHOLDER_ENTITY;
use super::super::entity::Entity;
use super::super::relation::Relation;
use super::super::store::GraphStore;

const VALIDATOR_SYSTEM_PROMPT: &str = "You are an expert in linguistics and knowledge graph. \
You will help determine that whether a relation is involved in the question. \
You should only output True or False.";

/// Validator answer accepting a candidate
const VALIDATOR_ACCEPT: &str = "True";

struct Frame<'a> {
    entity: &'a Entity,
    step: usize,
    next: usize,
}

/// Per-step data taken from the question graph
struct TemplateStep<'q> {
    relation: &'q Relation,
    relation_vector: &'q [f32],
    /// Embedding of the step's tail in the question graph, when indexed
    tail_vector: Option<&'q [f32]>,
}

impl GraphStore {
    /// Entities of this graph reached by following `path` from its head.
    ///
    /// `path` is a chain of relations from `query_graph`, ending at the
    /// unknown entity. The walk starts at this graph's counterpart of the
    /// path's head entity. At step `i` a relation is followed only if its
    /// embedding is similar enough to that of `path[i]`. Intermediate tails
    /// must also match the template's tail by name or similarity; at the last
    /// step `validator` decides instead, given `question` and the candidate
    /// relation. Entities reached past the last step are returned in
    /// discovery order without duplicates.
    ///
    /// Entities are visited at most once per call, so a template that would
    /// need to revisit a node is not followed.
    pub async fn find_matching_entities<'a>(
        &'a self,
        path: &[Relation],
        query_graph: &GraphStore,
        question: &str,
        validator: &dyn TextGenerator,
    ) -> Result<Vec<&'a Entity>> {
        let Some(first) = path.first() else {
            return Err(Error::InvalidPath("path has no relations".into()));
        };

        let steps = path
            .iter()
            .map(|relation| {
                Ok(TemplateStep {
                    relation,
                    relation_vector: query_graph.relation_vector(&relation.id)?,
                    tail_vector: query_graph.entity_vector(&relation.tail_entity_name).ok(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let start = self.counterpart_of(&first.head_entity_name, query_graph)?;
        debug!(
            template_head = %first.head_entity_name,
            start = %start.name,
            steps = steps.len(),
            "Matching question template"
        );

        let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);
        let mut matches: Vec<&Entity> = Vec::new();
        let mut stack = vec![Frame {
            entity: start,
            step: 0,
            next: 0,
        }];

        loop {
            let (entity, step, index) = match stack.last_mut() {
                Some(frame) => {
                    frame.next += 1;
                    (frame.entity, frame.step, frame.next - 1)
                }
                None => break,
            };

            let Some(relation_id) = entity.outgoing_relations.get(index) else {
                stack.pop();
                continue;
            };
            let Some(relation) = self.relations.get(relation_id) else {
                continue;
            };

            let template = &steps[step];
            let score = cosine_similarity(
                template.relation_vector,
                self.relation_vector(&relation.id)?,
            );
            if !self.is_match(score) {
                continue;
            }

            let Some(tail) = self.resolve_tail(relation).await? else {
                continue;
            };
            if visited.contains(tail.id.as_str()) {
                continue;
            }

            if step + 1 < steps.len() {
                if self.template_tail_matches(template, tail)? {
                    visited.insert(tail.id.as_str());
                    stack.push(Frame {
                        entity: tail,
                        step: step + 1,
                        next: 0,
                    });
                }
            } else if self.validate(question, relation, validator).await?
                && !matches.iter().any(|m| m.id == tail.id)
            {
                matches.push(tail);
            }
        }

        info!(
            template_head = %first.head_entity_name,
            matches = matches.len(),
            "Template matching finished"
        );
        Ok(matches)
    }

    /// Answer candidates for a question graph containing the placeholder.
    ///
    /// Each other entity of `query_graph` is an anchor; the path from the
    /// anchor to the placeholder is matched against this graph and the
    /// candidate sets of all anchors are intersected.
    pub async fn find_placeholder_matches<'a>(
        &'a self,
        query_graph: &GraphStore,
        question: &str,
        validator: &dyn TextGenerator,
    ) -> Result<Vec<&'a Entity>> {
        let placeholder = query_graph.entity(PLACEHOLDER_ENTITY).ok_or_else(|| {
            Error::QuestionShape(format!(
                "question graph has no {} placeholder",
                PLACEHOLDER_ENTITY
            ))
        })?;
        let anchors: Vec<&Entity> = query_graph
            .entities()
            .filter(|e| e.id != placeholder.id)
            .collect();
        if anchors.is_empty() {
            return Err(Error::QuestionShape(
                "question graph names no entity besides the placeholder".into(),
            ));
        }

        let mut candidates: Option<Vec<&'a Entity>> = None;
        for anchor in anchors {
            let path: Vec<Relation> = query_graph
                .path_between(anchor, placeholder)
                .await?
                .ok_or_else(|| {
                    Error::QuestionShape(format!(
                        "no path from '{}' to {} in question graph",
                        anchor.name, PLACEHOLDER_ENTITY
                    ))
                })?
                .into_iter()
                .cloned()
                .collect();

            let found = self
                .find_matching_entities(&path, query_graph, question, validator)
                .await?;
            debug!(anchor = %anchor.name, candidates = found.len(), "Anchor matched");

            let narrowed = match candidates {
                None => found,
                Some(previous) => {
                    let ids: HashSet<&str> = found.iter().map(|e| e.id.as_str()).collect();
                    previous
                        .into_iter()
                        .filter(|e| ids.contains(e.id.as_str()))
                        .collect()
                }
            };
            if narrowed.is_empty() {
                return Ok(Vec::new());
            }
            candidates = Some(narrowed);
        }

        Ok(candidates.unwrap_or_default())
    }

    /// Counterpart in this graph of the question graph's entity `name`
    fn counterpart_of(&self, name: &str, query_graph: &GraphStore) -> Result<&Entity> {
        if let Some(entity) = self.entities.get(name) {
            return Ok(entity);
        }

        let vector = query_graph.entity_vector(name).map_err(|_| {
            Error::InvalidPath(format!("head entity '{}' is not in the question graph", name))
        })?;
        self.nearest_entity(vector, name)
            .ok_or_else(|| Error::SourceEntityNotFound(name.to_string()))
    }

    fn template_tail_matches(&self, template: &TemplateStep<'_>, tail: &Entity) -> Result<bool> {
        if tail.name == template.relation.tail_entity_name {
            return Ok(true);
        }
        match template.tail_vector {
            Some(query) => {
                let stored = self.entity_index.query_by_id(&tail.id)?;
                Ok(self.is_match(cosine_similarity(query, stored)))
            }
            None => Ok(false),
        }
    }

    async fn validate(
        &self,
        question: &str,
        relation: &Relation,
        validator: &dyn TextGenerator,
    ) -> Result<bool> {
        let prompt = format!("Question: {}\n\n{}", question, relation);
        let answer = validator
            .generate(VALIDATOR_SYSTEM_PROMPT, &prompt, &GenerationOptions::default())
            .await?;
        let accepted = answer.trim() == VALIDATOR_ACCEPT;
        debug!(relation_id = %relation.id, accepted, "Validated last hop");
        Ok(accepted)
    }
}
