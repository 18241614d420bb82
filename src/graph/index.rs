use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::error::Result;

use super::entity::{Entity, EntityType};
use super::relationship::{Relationship, RelationshipType};
use super::store::GraphStore;

/// An entity plus its resolved adjacency, built once per load and refreshed
/// incrementally thereafter.
#[derive(Debug, Clone)]
struct GraphNode {
    outgoing: Vec<(Relationship, String)>,
    incoming: Vec<(Relationship, String)>,
}

/// Direction of traversal for `get_connected_entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub entity: Entity,
    pub relationship: Relationship,
    pub direction: EdgeDirection,
    pub distance: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subgraph {
    pub entities: HashMap<String, Entity>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct Centrality {
    pub degree: usize,
    pub in_degree: usize,
    pub out_degree: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entity_type_counts: HashMap<String, usize>,
    pub relationship_type_counts: HashMap<String, usize>,
    pub average_degree: f64,
    pub isolated_entities: usize,
}

/// In-memory adjacency and inverted indices over the latest-version graph.
/// Built by a full load from the `GraphStore`; kept eventually consistent
/// with it by incremental updates applied after every committed write.
#[derive(Default)]
pub struct GraphIndex {
    entities: HashMap<String, Entity>,
    nodes: HashMap<String, GraphNode>,
    relationships_by_source: HashMap<String, Vec<Relationship>>,
    relationships_by_target: HashMap<String, Vec<Relationship>>,
    relationships_by_type: HashMap<RelationshipType, Vec<Relationship>>,
    entities_by_type: HashMap<EntityType, HashSet<String>>,
    // Keyed by the full lowercased name; fuzzy search does substring
    // containment against these keys at query time.
    entities_by_name: HashMap<String, HashSet<String>>,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.nodes.clear();
        self.relationships_by_source.clear();
        self.relationships_by_target.clear();
        self.relationships_by_type.clear();
        self.entities_by_type.clear();
        self.entities_by_name.clear();
    }

    /// Full load: reads the latest-version graph from the store and
    /// populates every index from scratch.
    pub fn load_from_storage(&mut self, store: &GraphStore) -> Result<()> {
        self.clear();

        for entity_type in EntityType::all() {
            for entity in store.get_entities_by_type(*entity_type)? {
                self.index_entity(entity);
            }
        }

        for rel in store.get_relationships(None, None, None, false)? {
            self.index_relationship(rel);
        }

        self.build_nodes();
        Ok(())
    }

    /// Incremental update applied after a write commits through L1.
    pub fn apply_entity_write(&mut self, entity: Entity) {
        self.index_entity(entity);
        self.build_nodes();
    }

    /// Incremental update applied after a relationship write commits.
    pub fn apply_relationship_write(&mut self, rel: Relationship) {
        self.index_relationship(rel);
        self.build_nodes();
    }

    fn index_entity(&mut self, entity: Entity) {
        self.entities_by_type
            .entry(entity.entity_type)
            .or_default()
            .insert(entity.entity_id.clone());
        self.entities_by_name
            .entry(entity.name.to_lowercase())
            .or_default()
            .insert(entity.entity_id.clone());
        self.entities.insert(entity.entity_id.clone(), entity);
    }

    fn index_relationship(&mut self, rel: Relationship) {
        self.relationships_by_source
            .entry(rel.from_entity_id.clone())
            .or_default()
            .push(rel.clone());
        self.relationships_by_target
            .entry(rel.to_entity_id.clone())
            .or_default()
            .push(rel.clone());
        self.relationships_by_type
            .entry(rel.relationship_type)
            .or_default()
            .push(rel);
    }

    fn build_nodes(&mut self) {
        self.nodes.clear();
        for entity_id in self.entities.keys().cloned().collect::<Vec<_>>() {
            let outgoing = self
                .relationships_by_source
                .get(&entity_id)
                .map(|rels| rels.iter().map(|r| (r.clone(), r.to_entity_id.clone())).collect())
                .unwrap_or_default();
            let incoming = self
                .relationships_by_target
                .get(&entity_id)
                .map(|rels| {
                    rels.iter()
                        .map(|r| (r.clone(), r.from_entity_id.clone()))
                        .collect()
                })
                .unwrap_or_default();
            self.nodes.insert(entity_id, GraphNode { outgoing, incoming });
        }
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    /// Every indexed entity (latest version only), in no particular order.
    /// Backs `search_entities`/`find_similar_entities` in the tool catalog.
    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Breadth-first search over outgoing edges, returning the first path
    /// found within `max_depth` hops; empty if unreachable.
    pub fn find_path(&self, from_id: &str, to_id: &str, max_depth: u32) -> Vec<String> {
        if !self.nodes.contains_key(from_id) || !self.nodes.contains_key(to_id) {
            return vec![];
        }
        if from_id == to_id {
            return vec![from_id.to_string()];
        }

        let mut queue: VecDeque<(String, Vec<String>)> =
            VecDeque::from([(from_id.to_string(), vec![from_id.to_string()])]);
        let mut visited: HashSet<String> = HashSet::from([from_id.to_string()]);
        let mut depth = 0u32;

        while !queue.is_empty() && depth < max_depth {
            let level_size = queue.len();
            for _ in 0..level_size {
                let (current, path) = queue.pop_front().unwrap();
                if let Some(node) = self.nodes.get(&current) {
                    for (_, next_id) in &node.outgoing {
                        if next_id == to_id {
                            let mut found = path.clone();
                            found.push(to_id.to_string());
                            return found;
                        }
                        if !visited.contains(next_id) && self.nodes.contains_key(next_id) {
                            visited.insert(next_id.clone());
                            let mut next_path = path.clone();
                            next_path.push(next_id.clone());
                            queue.push_back((next_id.clone(), next_path));
                        }
                    }
                }
            }
            depth += 1;
        }

        vec![]
    }

    /// BFS that yields each distinct entity at its shortest observed
    /// distance, annotated with the connecting edge and direction. An edge is
    /// reported the moment it is seen even if the target was already
    /// visited; only further expansion is gated by `depth + 1 < max_depth`.
    pub fn get_connected_entities(
        &self,
        entity_id: &str,
        rel_type: Option<RelationshipType>,
        direction: Direction,
        max_depth: u32,
    ) -> Vec<Connection> {
        if !self.nodes.contains_key(entity_id) {
            return vec![];
        }

        let mut results = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([entity_id.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(entity_id.to_string(), 0)]);

        while let Some((current_id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let node = match self.nodes.get(&current_id) {
                Some(n) => n,
                None => continue,
            };

            if matches!(direction, Direction::Outgoing | Direction::Both) {
                for (rel, target_id) in &node.outgoing {
                    if let Some(rt) = rel_type {
                        if rel.relationship_type != rt {
                            continue;
                        }
                    }
                    if let Some(entity) = self.entities.get(target_id) {
                        results.push(Connection {
                            entity: entity.clone(),
                            relationship: rel.clone(),
                            direction: EdgeDirection::Outgoing,
                            distance: depth + 1,
                        });
                        if !visited.contains(target_id) && depth + 1 < max_depth {
                            visited.insert(target_id.clone());
                            queue.push_back((target_id.clone(), depth + 1));
                        }
                    }
                }
            }

            if matches!(direction, Direction::Incoming | Direction::Both) {
                for (rel, source_id) in &node.incoming {
                    if let Some(rt) = rel_type {
                        if rel.relationship_type != rt {
                            continue;
                        }
                    }
                    if let Some(entity) = self.entities.get(source_id) {
                        results.push(Connection {
                            entity: entity.clone(),
                            relationship: rel.clone(),
                            direction: EdgeDirection::Incoming,
                            distance: depth + 1,
                        });
                        if !visited.contains(source_id) && depth + 1 < max_depth {
                            visited.insert(source_id.clone());
                            queue.push_back((source_id.clone(), depth + 1));
                        }
                    }
                }
            }
        }

        results
    }

    /// Fuzzy: any indexed full name containing the lowercased query. Exact:
    /// whole-name equality after lowercasing.
    pub fn find_entities_by_name(&self, name: &str, fuzzy: bool) -> Vec<&Entity> {
        let needle = name.to_lowercase();
        let mut ids: HashSet<&String> = HashSet::new();

        if fuzzy {
            for (indexed_name, entity_ids) in &self.entities_by_name {
                if indexed_name.contains(&needle) {
                    ids.extend(entity_ids.iter());
                }
            }
        } else if let Some(entity_ids) = self.entities_by_name.get(&needle) {
            ids.extend(entity_ids.iter());
        }

        ids.into_iter().filter_map(|id| self.entities.get(id)).collect()
    }

    pub fn get_subgraph(&self, ids: &HashSet<String>, include_relationships: bool) -> Subgraph {
        let entities: HashMap<String, Entity> = self
            .entities
            .iter()
            .filter(|(id, _)| ids.contains(*id))
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();

        let mut relationships = Vec::new();
        if include_relationships {
            for id in ids {
                if let Some(rels) = self.relationships_by_source.get(id) {
                    for rel in rels {
                        if ids.contains(&rel.to_entity_id) {
                            relationships.push(rel.clone());
                        }
                    }
                }
            }
        }

        Subgraph { entities, relationships }
    }

    pub fn calculate_centrality(&self, entity_id: &str) -> Centrality {
        match self.nodes.get(entity_id) {
            Some(node) => Centrality {
                degree: node.incoming.len() + node.outgoing.len(),
                in_degree: node.incoming.len(),
                out_degree: node.outgoing.len(),
            },
            None => Centrality::default(),
        }
    }

    /// Depth-limited DFS returning all simple cycles through `start_id` up to
    /// `max_length`, using shared backtracking state (not per-path copies).
    pub fn find_cycles(&self, start_id: &str, max_length: usize) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        if !self.nodes.contains_key(start_id) {
            return cycles;
        }

        let mut visited: HashSet<String> = HashSet::from([start_id.to_string()]);
        let mut path = vec![start_id.to_string()];
        self.dfs_cycles(start_id, &mut path, &mut visited, start_id, max_length, &mut cycles);
        cycles
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_cycles(
        &self,
        current: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
        start_id: &str,
        max_length: usize,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if path.len() > max_length {
            return;
        }
        let node = match self.nodes.get(current) {
            Some(n) => n,
            None => return,
        };

        for (_, next_id) in &node.outgoing {
            if next_id == start_id && path.len() > 2 {
                let mut cycle = path.clone();
                cycle.push(start_id.to_string());
                cycles.push(cycle);
            } else if !visited.contains(next_id) {
                visited.insert(next_id.clone());
                path.push(next_id.clone());
                self.dfs_cycles(next_id, path, visited, start_id, max_length, cycles);
                path.pop();
                visited.remove(next_id);
            }
        }
    }

    pub fn get_statistics(&self) -> GraphStatistics {
        let entity_type_counts = self
            .entities_by_type
            .iter()
            .map(|(t, ids)| (t.as_str().to_string(), ids.len()))
            .collect();

        let relationship_type_counts = self
            .relationships_by_type
            .iter()
            .map(|(t, rels)| (t.as_str().to_string(), rels.len()))
            .collect();

        let total_degree: usize = self
            .nodes
            .values()
            .map(|n| n.incoming.len() + n.outgoing.len())
            .sum();
        let average_degree = if self.nodes.is_empty() {
            0.0
        } else {
            total_degree as f64 / self.nodes.len() as f64
        };

        let isolated_entities = self
            .nodes
            .values()
            .filter(|n| n.incoming.is_empty() && n.outgoing.is_empty())
            .count();

        GraphStatistics {
            total_entities: self.entities.len(),
            total_relationships: self.relationships_by_source.values().map(Vec::len).sum(),
            entity_type_counts,
            relationship_type_counts,
            average_degree,
            isolated_entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entity::SourceType;
    use chrono::Utc;

    fn entity(id: &str, ty: EntityType, name: &str) -> Entity {
        let now = Utc::now();
        Entity {
            entity_id: id.to_string(),
            version: format!("v-{}", id),
            entity_type: ty,
            name: name.to_string(),
            content: serde_json::json!({}),
            source_type: SourceType::Manual,
            user_id: "u1".to_string(),
            parent_versions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn rel(from: &str, to: &str, ty: RelationshipType) -> Relationship {
        Relationship {
            id: format!("{}-{}-{}", from, to, ty.as_str()),
            from_entity_id: from.to_string(),
            from_entity_version: format!("v-{}", from),
            to_entity_id: to.to_string(),
            to_entity_version: format!("v-{}", to),
            relationship_type: ty,
            properties: serde_json::json!({}),
            user_id: "u1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn chain_index() -> GraphIndex {
        let mut idx = GraphIndex::new();
        idx.index_entity(entity("d1", EntityType::Device, "Lamp"));
        idx.index_entity(entity("r1", EntityType::Room, "Living Room"));
        idx.index_entity(entity("z1", EntityType::Zone, "Upstairs"));
        idx.index_relationship(rel("d1", "r1", RelationshipType::LocatedIn));
        idx.index_relationship(rel("r1", "z1", RelationshipType::LocatedIn));
        idx.build_nodes();
        idx
    }

    #[test]
    fn find_path_follows_located_in_chain() {
        let idx = chain_index();
        let path = idx.find_path("d1", "z1", 5);
        assert_eq!(path, vec!["d1", "r1", "z1"]);
    }

    #[test]
    fn find_path_returns_empty_when_disconnected() {
        let mut idx = chain_index();
        idx.index_entity(entity("d2", EntityType::Device, "Isolated"));
        idx.build_nodes();
        assert_eq!(idx.find_path("d2", "z1", 5), Vec::<String>::new());
    }

    #[test]
    fn connected_entities_respect_max_depth() {
        let idx = chain_index();
        let direct = idx.get_connected_entities("d1", None, Direction::Outgoing, 1);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].entity.entity_id, "r1");

        let two_hop = idx.get_connected_entities("d1", None, Direction::Outgoing, 2);
        assert_eq!(two_hop.len(), 2);
    }

    #[test]
    fn fuzzy_name_search_matches_substring() {
        let idx = chain_index();
        let hits = idx.find_entities_by_name("living", true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, "r1");

        let exact_miss = idx.find_entities_by_name("living", false);
        assert!(exact_miss.is_empty());
    }

    #[test]
    fn centrality_counts_in_and_out_degree() {
        let idx = chain_index();
        let c = idx.calculate_centrality("r1");
        assert_eq!(c.in_degree, 1);
        assert_eq!(c.out_degree, 1);
        assert_eq!(c.degree, 2);
    }

    #[test]
    fn centrality_missing_node_is_zero() {
        let idx = chain_index();
        let c = idx.calculate_centrality("nope");
        assert_eq!(c.degree, 0);
    }

    #[test]
    fn find_cycles_detects_simple_cycle() {
        let mut idx = GraphIndex::new();
        idx.index_entity(entity("a", EntityType::Automation, "A"));
        idx.index_entity(entity("b", EntityType::Automation, "B"));
        idx.index_entity(entity("c", EntityType::Automation, "C"));
        idx.index_relationship(rel("a", "b", RelationshipType::DependsOn));
        idx.index_relationship(rel("b", "c", RelationshipType::DependsOn));
        idx.index_relationship(rel("c", "a", RelationshipType::DependsOn));
        idx.build_nodes();

        let cycles = idx.find_cycles("a", 5);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn statistics_reports_isolated_entities() {
        let mut idx = chain_index();
        idx.index_entity(entity("lonely", EntityType::Note, "Lonely"));
        idx.build_nodes();
        let stats = idx.get_statistics();
        assert_eq!(stats.total_entities, 4);
        assert_eq!(stats.isolated_entities, 1);
    }
}
