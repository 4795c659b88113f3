//! Directed path discovery

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;

use super::super::entity::Entity;
use super::super::relation::Relation;
use super::super::store::GraphStore;

struct Frame<'a> {
    entity: &'a Entity,
    next: usize,
}

impl GraphStore {
    /// Find a chain of relations leading from `source` to `target`.
    ///
    /// Both names resolve as in [`GraphStore::find_entity`]. The search is
    /// depth-first over outgoing relations in insertion order and returns the
    /// first path found, which need not be the shortest. `Ok(None)` means an
    /// endpoint did not resolve or no path exists; a path from an entity to
    /// itself is empty.
    pub async fn find_path(&self, source: &str, target: &str) -> Result<Option<Vec<&Relation>>> {
        let Some(source) = self.find_entity(source).await? else {
            return Ok(None);
        };
        let Some(target) = self.find_entity(target).await? else {
            return Ok(None);
        };
        self.path_between(source, target).await
    }

    /// Depth-first search between two resolved entities
    pub(in crate::domain::knowledge) async fn path_between<'a>(
        &'a self,
        source: &'a Entity,
        target: &'a Entity,
    ) -> Result<Option<Vec<&'a Relation>>> {
        if source.id == target.id {
            return Ok(Some(Vec::new()));
        }

        let mut visited: HashSet<&str> = HashSet::from([source.id.as_str()]);
        let mut stack = vec![Frame {
            entity: source,
            next: 0,
        }];
        // path[i] is the relation entering stack[i + 1]
        let mut path: Vec<&Relation> = Vec::new();

        loop {
            let (entity, index) = match stack.last_mut() {
                Some(frame) => {
                    frame.next += 1;
                    (frame.entity, frame.next - 1)
                }
                None => break,
            };

            let Some(relation_id) = entity.outgoing_relations.get(index) else {
                stack.pop();
                path.pop();
                continue;
            };
            let Some(relation) = self.relations.get(relation_id) else {
                continue;
            };
            let Some(next) = self.resolve_tail(relation).await? else {
                continue;
            };

            if next.id == target.id {
                path.push(relation);
                debug!(
                    source = %source.name,
                    target = %target.name,
                    hops = path.len(),
                    "Found path"
                );
                return Ok(Some(path));
            }
            if !visited.insert(next.id.as_str()) {
                continue;
            }

            path.push(relation);
            stack.push(Frame {
                entity: next,
                next: 0,
            });
        }

        debug!(source = %source.name, target = %target.name, "No path");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::knowledge::testing::ScriptedEmbedder;

    async fn chain() -> GraphStore {
        let mut graph = GraphStore::in_memory(Arc::new(ScriptedEmbedder::new()));
        for name in ["A", "B", "C", "D"] {
            graph.add_entity(Entity::new(name)).await.unwrap();
        }
        for (name, head, tail) in [
            ("rel1_Relation", "A", "B"),
            ("rel2_Relation", "B", "C"),
            ("loop_Relation", "B", "A"),
            ("side_Relation", "A", "D"),
        ] {
            graph
                .add_relation(Relation::new(name, head, tail))
                .await
                .unwrap();
        }
        graph
    }

    fn names(path: &[&Relation]) -> Vec<String> {
        path.iter().map(|r| r.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_forward_path() {
        let graph = chain().await;
        let path = graph.find_path("A", "C").await.unwrap().unwrap();
        assert_eq!(names(&path), vec!["rel1_Relation", "rel2_Relation"]);
    }

    #[tokio::test]
    async fn test_backtracks_out_of_dead_ends() {
        let graph = chain().await;
        let path = graph.find_path("A", "D").await.unwrap().unwrap();
        assert_eq!(names(&path), vec!["side_Relation"]);
    }

    #[tokio::test]
    async fn test_no_reverse_traversal() {
        let graph = chain().await;
        assert!(graph.find_path("C", "A").await.unwrap().is_none());
        assert!(graph.find_path("D", "B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_to_self_is_empty() {
        let graph = chain().await;
        let path = graph.find_path("A", "A").await.unwrap().unwrap();
        assert!(path.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_back_to_start_is_a_path() {
        let graph = chain().await;
        let path = graph.find_path("B", "A").await.unwrap().unwrap();
        assert_eq!(names(&path), vec!["loop_Relation"]);
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let graph = chain().await;
        assert!(graph.find_path("A", "Z").await.unwrap().is_none());
        assert!(graph.find_path("Z", "A").await.unwrap().is_none());
    }
}
