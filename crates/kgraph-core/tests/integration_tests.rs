//! KGraph Core Integration Tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use kgraph_core::{
    Error, Result,
    domain::knowledge::{
        DEFAULT_SIMILARITY_THRESHOLD, Entity, ExtractionBatch, GraphSnapshot, GraphStore,
        PLACEHOLDER_ENTITY, Relation,
    },
    llm::{Embedder, GenerationOptions, HashEmbedder, TextGenerator},
    similarity::cosine_similarity,
};

const DIMS: usize = 64;

/// Fixed vectors for scripted text, a fresh one-hot vector for anything else
#[derive(Default)]
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    others: Mutex<HashMap<String, Vec<f32>>>,
}

impl TableEmbedder {
    fn with(mut self, text: &str, head: &[f32]) -> Self {
        let mut vector = vec![0.0; DIMS];
        vector[..head.len()].copy_from_slice(head);
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.table.get(text) {
            return Ok(vector.clone());
        }
        let mut others = self.others.lock().unwrap();
        let slot = 8 + others.len();
        assert!(slot < DIMS, "too many unscripted texts");
        Ok(others
            .entry(text.to_string())
            .or_insert_with(|| {
                let mut v = vec![0.0; DIMS];
                v[slot] = 1.0;
                v
            })
            .clone())
    }
}

/// Generator replying by user-prompt substring
struct RuleGenerator {
    rules: Vec<(&'static str, &'static str)>,
    fallback: &'static str,
    calls: Mutex<usize>,
}

impl RuleGenerator {
    fn new(fallback: &'static str, rules: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            rules,
            fallback,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGenerator for RuleGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| user_prompt.contains(needle))
            .map(|(_, answer)| answer.to_string())
            .unwrap_or_else(|| self.fallback.to_string()))
    }
}

async fn uiuc_graph(embedder: Arc<dyn Embedder>) -> GraphStore {
    let mut graph = GraphStore::in_memory(embedder);
    graph.add_entity(Entity::new("UIUC")).await.unwrap();
    graph.add_entity(Entity::new("Barbara Wilson")).await.unwrap();
    graph
        .add_relation(
            Relation::new("Chancellor_of_Relation", "Barbara Wilson", "UIUC")
                .with_property("start_time", "2015")
                .with_property("end_time", "2016"),
        )
        .await
        .unwrap();
    graph
}

#[tokio::test]
async fn test_chancellor_scenario() {
    let graph = uiuc_graph(Arc::new(HashEmbedder::default())).await;

    let relation = graph
        .find_relation("Barbara Wilson", "UIUC", "Chancellor_of_Relation")
        .await
        .unwrap()
        .expect("relation should be found");
    assert_eq!(relation.properties.get("start_time").unwrap(), "2015");
    assert_eq!(relation.properties.get("end_time").unwrap(), "2016");

    let reversed = graph
        .find_relation("UIUC", "Barbara Wilson", "Chancellor_of_Relation")
        .await
        .unwrap();
    assert!(reversed.is_none());
}

#[tokio::test]
async fn test_exact_name_wins_over_closer_vector() {
    // Both names embed identically, so similarity alone cannot tell them apart
    let embedder = TableEmbedder::default()
        .with("Alpha", &[1.0, 0.0])
        .with("Beta", &[1.0, 0.0]);
    let mut graph = GraphStore::in_memory(Arc::new(embedder));
    graph.add_entity(Entity::new("Alpha")).await.unwrap();
    graph.add_entity(Entity::new("Beta")).await.unwrap();

    assert_eq!(graph.find_entity("Alpha").await.unwrap().unwrap().name, "Alpha");
    assert_eq!(graph.find_entity("Beta").await.unwrap().unwrap().name, "Beta");
}

#[tokio::test]
async fn test_similarity_gate_is_inclusive() {
    let embedder = Arc::new(
        TableEmbedder::default()
            .with("UIUC", &[1.0, 0.0, 0.0])
            .with("U of I", &[0.8, 0.6, 0.0]),
    );
    let score = cosine_similarity(
        &embedder.embed("U of I").await.unwrap(),
        &embedder.embed("UIUC").await.unwrap(),
    );

    let mut at_score = GraphStore::in_memory(embedder.clone()).with_similarity_threshold(score);
    at_score.add_entity(Entity::new("UIUC")).await.unwrap();
    let found = at_score.find_entity("U of I").await.unwrap();
    assert_eq!(found.map(|e| e.name.as_str()), Some("UIUC"));

    let mut above_score =
        GraphStore::in_memory(embedder.clone()).with_similarity_threshold(score + 1e-6);
    above_score.add_entity(Entity::new("UIUC")).await.unwrap();
    assert!(above_score.find_entity("U of I").await.unwrap().is_none());

    // 0.8 is below the default threshold
    let mut default = GraphStore::in_memory(embedder);
    assert_eq!(default.similarity_threshold(), DEFAULT_SIMILARITY_THRESHOLD);
    default.add_entity(Entity::new("UIUC")).await.unwrap();
    assert!(default.find_entity("U of I").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reinsertion_merges_without_new_vector() {
    let mut graph = GraphStore::in_memory(Arc::new(HashEmbedder::default()));
    let first = graph
        .add_entity(Entity::new("UIUC").with_description("A university"))
        .await
        .unwrap();
    let second = graph
        .add_entity(Entity::new("UIUC").with_description("in Urbana"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(graph.entity_count(), 1);
    assert_eq!(graph.entity_index().len(), 1);
    assert_eq!(graph.entity("UIUC").unwrap().description, "A university in Urbana");
}

#[tokio::test]
async fn test_relation_listed_once_by_head() {
    let graph = uiuc_graph(Arc::new(HashEmbedder::default())).await;

    for relation in graph.relations() {
        let head = graph.entity(&relation.head_entity_name).unwrap();
        let listed = head
            .outgoing_relations()
            .iter()
            .filter(|id| **id == relation.id)
            .count();
        assert_eq!(listed, 1);
    }
}

#[tokio::test]
async fn test_completion_closure_and_paths() {
    let mut graph = GraphStore::in_memory(Arc::new(HashEmbedder::default()));
    for name in ["A", "B", "C"] {
        graph.add_entity(Entity::new(name)).await.unwrap();
    }
    graph
        .add_relation(Relation::new("rel1_Relation", "A", "B"))
        .await
        .unwrap();
    graph
        .add_relation(Relation::new("rel2_Relation", "B", "C"))
        .await
        .unwrap();

    let path = graph.find_path("A", "C").await.unwrap().unwrap();
    let names: Vec<&str> = path.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["rel1_Relation", "rel2_Relation"]);
    assert!(graph.find_path("C", "A").await.unwrap().is_none());
    assert!(graph.find_path("A", "A").await.unwrap().unwrap().is_empty());

    let generator = RuleGenerator::new(
        "Inverse_Relation",
        vec![
            ("Relation: rel1_Relation", "Inverse Relation: inv1"),
            ("Relation: rel2_Relation", "inv2_Relation"),
        ],
    );
    let report = graph.complete_relations(&generator).await.unwrap();
    assert_eq!(report.synthesized.len(), 2);

    let relations: Vec<Relation> = graph.relations().cloned().collect();
    for relation in &relations {
        assert!(graph.has_relation_between(&relation.tail_entity_name, &relation.head_entity_name));
    }

    let back = graph.find_path("C", "A").await.unwrap().unwrap();
    let names: Vec<&str> = back.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["inv2_Relation", "inv1_Relation"]);

    // A second run finds nothing to do
    let calls = generator.calls();
    let report = graph.complete_relations(&generator).await.unwrap();
    assert!(report.synthesized.is_empty());
    assert_eq!(generator.calls(), calls);
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_queries() {
    let dir = TempDir::new().unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let graph = uiuc_graph(embedder.clone()).await;
    let snapshot_path = dir.path().join("kg_save").join("knowledge_graph.json");

    graph.save_snapshot(&snapshot_path).unwrap();
    let restored = GraphStore::load_snapshot(
        &snapshot_path,
        Some(dir.path().join("vdb")),
        embedder,
    )
    .unwrap();

    assert_eq!(restored.stats(), graph.stats());
    let original_ids: Vec<&str> = graph.entities().map(|e| e.id.as_str()).collect();
    let restored_ids: Vec<&str> = restored.entities().map(|e| e.id.as_str()).collect();
    assert_eq!(original_ids, restored_ids);

    let relation = restored
        .find_relation("Barbara Wilson", "UIUC", "Chancellor_of_Relation")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relation.properties.get("end_time").unwrap(), "2016");
    assert!(dir.path().join("vdb").join("entity_vdb.json").exists());

    let reloaded = GraphSnapshot::load(&snapshot_path).unwrap();
    assert_eq!(reloaded.entities.len(), 2);
}

#[tokio::test]
async fn test_question_answered_through_placeholder() {
    let embedder: Arc<dyn Embedder> = Arc::new(
        TableEmbedder::default()
            .with("UIUC", &[1.0, 0.0, 0.0, 0.0])
            .with("University of Illinois", &[0.96, 0.28, 0.0, 0.0])
            .with("Urbana", &[0.0, 1.0, 0.0, 0.0])
            .with("Chancellor_of_Relation", &[0.0, 0.0, 1.0, 0.0])
            .with("Has_Chancellor_Relation", &[0.0, 0.0, 0.0, 1.0])
            .with("Located_in_Relation", &[0.3, 0.3, 0.3, 0.3]),
    );

    let mut graph = GraphStore::in_memory(embedder.clone());
    let batch = ExtractionBatch::from_llm_output(
        r#"```json
{
  "entities": [
    {"name": "UIUC", "types": ["University"]},
    {"name": "Urbana", "types": ["City"]},
    {"name": "Barbara Wilson", "types": ["Person"]},
    {"name": "Robert Jones", "types": ["Person"]}
  ],
  "relations": [
    {"name": "Chancellor of", "head": "Barbara Wilson", "tail": "UIUC",
     "properties": {"start_time": "2015", "end_time": "2016"}},
    {"name": "Chancellor of", "head": "Robert Jones", "tail": "UIUC",
     "properties": {"start_time": "2016", "end_time": "2023"}},
    {"name": "Located in", "head": "UIUC", "tail": "Urbana"}
  ]
}
```"#,
    )
    .unwrap();
    let report = graph.ingest(batch).await.unwrap();
    assert_eq!(report.relations_added, 3);

    let namer = RuleGenerator::new(
        "Has_Chancellor_Relation",
        vec![("Located_in_Relation", "Contains")],
    );
    graph.complete_relations(&namer).await.unwrap();
    assert!(graph.has_relation_between("UIUC", "Barbara Wilson"));

    // "[ENTITY] is the Chancellor of the University of Illinois from 2015-2016."
    let mut question = GraphStore::in_memory(embedder);
    question
        .add_entity(Entity::new(PLACEHOLDER_ENTITY))
        .await
        .unwrap();
    question
        .add_entity(Entity::new("University of Illinois"))
        .await
        .unwrap();
    question
        .add_relation(Relation::new(
            "Has_Chancellor_Relation",
            "University of Illinois",
            PLACEHOLDER_ENTITY,
        ))
        .await
        .unwrap();

    let validator = RuleGenerator::new("False", vec![("start_time: 2015", "True")]);
    let answers = graph
        .find_placeholder_matches(
            &question,
            "Who is the Chancellor of UIUC from 2015-2016?",
            &validator,
        )
        .await
        .unwrap();

    let names: Vec<&str> = answers.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Barbara Wilson"]);
}

#[tokio::test]
async fn test_source_entity_missing_is_fatal() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let graph = uiuc_graph(embedder.clone()).await;

    let mut question = GraphStore::in_memory(embedder);
    question.add_entity(Entity::new("Stanford")).await.unwrap();
    question
        .add_entity(Entity::new(PLACEHOLDER_ENTITY))
        .await
        .unwrap();
    question
        .add_relation(Relation::new(
            "Has_Chancellor_Relation",
            "Stanford",
            PLACEHOLDER_ENTITY,
        ))
        .await
        .unwrap();

    let validator = RuleGenerator::new("True", Vec::new());
    let result = graph
        .find_placeholder_matches(&question, "Who is the president of Stanford?", &validator)
        .await;

    assert!(matches!(result, Err(Error::SourceEntityNotFound(name)) if name == "Stanford"));
    assert_eq!(validator.calls(), 0);
}
