//! Relationship graph over one cycle's entities.
//!
//! The graph is rebuilt from scratch on every [`RelationshipGraphBuilder::build_graph`]
//! call. All maps are ordered so queries and exports are deterministic.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::entity::{RelationshipEdge, RelationshipType, SynthesizedEntity};
use crate::models::EntityType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub guid: String,
    pub entity_type: EntityType,
    pub display_name: String,
    pub cluster_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_type: BTreeMap<EntityType, usize>,
    pub edges_by_type: BTreeMap<RelationshipType, usize>,
    pub orphaned_nodes: usize,
    pub cycles: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<RelationshipEdge>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraphBuilder {
    nodes: BTreeMap<String, GraphNode>,
    /// source -> outgoing edges
    adjacency: BTreeMap<String, Vec<RelationshipEdge>>,
    /// target -> sources
    reverse: BTreeMap<String, BTreeSet<String>>,
    dropped_edges: usize,
}

impl RelationshipGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the graph with one built from `entities`.
    pub fn build_graph(&mut self, entities: &[SynthesizedEntity]) {
        self.nodes.clear();
        self.adjacency.clear();
        self.reverse.clear();
        self.dropped_edges = 0;

        for entity in entities {
            self.nodes.insert(
                entity.guid().to_string(),
                GraphNode {
                    guid: entity.guid().to_string(),
                    entity_type: entity.entity_type(),
                    display_name: entity.display_name().to_string(),
                    cluster_name: entity.cluster_name().to_string(),
                },
            );
        }

        for entity in entities {
            for edge in entity.relationships() {
                self.add_edge(edge.clone());
            }
        }

        self.infer_containment(entities);
        self.infer_consumption(entities);

        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edge_count(),
            dropped = self.dropped_edges,
            "relationship graph built"
        );
    }

    /// Every non-cluster entity is CONTAINED_IN each cluster entity of the
    /// same cluster name.
    fn infer_containment(&mut self, entities: &[SynthesizedEntity]) {
        let clusters: Vec<(&str, &str)> = entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::Cluster)
            .map(|e| (e.cluster_name(), e.guid()))
            .collect();

        for entity in entities.iter().filter(|e| e.entity_type() != EntityType::Cluster) {
            for (cluster_name, cluster_guid) in &clusters {
                if *cluster_name == entity.cluster_name() {
                    self.add_edge(
                        RelationshipEdge::new(RelationshipType::ContainedIn, entity.guid(), *cluster_guid)
                            .with_attribute("inferred", "true"),
                    );
                }
            }
        }
    }

    /// Consumer group -> CONSUMES_FROM -> each subscribed topic present in
    /// the same cluster.
    fn infer_consumption(&mut self, entities: &[SynthesizedEntity]) {
        let topics: Vec<(&str, &str, &str)> = entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::Topic)
            .filter_map(|e| e.tag("topicName").map(|name| (e.cluster_name(), name, e.guid())))
            .collect();

        for group in entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::ConsumerGroup)
        {
            for subscribed in &group.metadata().topics {
                for (cluster_name, topic_name, topic_guid) in &topics {
                    if *cluster_name == group.cluster_name() && *topic_name == subscribed.as_str() {
                        self.add_edge(
                            RelationshipEdge::new(RelationshipType::ConsumesFrom, group.guid(), *topic_guid)
                                .with_attribute("inferred", "true"),
                        );
                    }
                }
            }
        }
    }

    /// Adds `edge` if both endpoints exist and the same link is not already
    /// present.
    fn add_edge(&mut self, edge: RelationshipEdge) -> bool {
        if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
            tracing::trace!(
                source = %edge.source,
                target = %edge.target,
                relationship = %edge.relationship_type,
                "dropping edge with missing endpoint"
            );
            self.dropped_edges += 1;
            return false;
        }
        let outgoing = self.adjacency.entry(edge.source.clone()).or_default();
        if outgoing.iter().any(|e| e.same_link(&edge)) {
            return false;
        }
        self.reverse
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.source.clone());
        outgoing.push(edge);
        true
    }

    pub fn node(&self, guid: &str) -> Option<&GraphNode> {
        self.nodes.get(guid)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Edges dropped in the last build because an endpoint was missing.
    pub fn dropped_edges(&self) -> usize {
        self.dropped_edges
    }

    /// Outgoing edges of `guid` followed by the incoming ones.
    pub fn get_relationships(&self, guid: &str) -> Vec<RelationshipEdge> {
        let mut edges: Vec<RelationshipEdge> = self.adjacency.get(guid).cloned().unwrap_or_default();
        if let Some(sources) = self.reverse.get(guid) {
            // a self-loop is already among the outgoing edges
            for source in sources.iter().filter(|s| s.as_str() != guid) {
                if let Some(outgoing) = self.adjacency.get(source) {
                    edges.extend(outgoing.iter().filter(|e| e.target == guid).cloned());
                }
            }
        }
        edges
    }

    /// Distinct neighbours of `guid` in either direction, optionally limited
    /// to one relationship type.
    pub fn get_related_entities(
        &self,
        guid: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Vec<&GraphNode> {
        let related: BTreeSet<String> = self
            .get_relationships(guid)
            .into_iter()
            .filter(|e| relationship_type.is_none_or(|t| e.relationship_type == t))
            .map(|e| if e.source == guid { e.target } else { e.source })
            .collect();
        related.iter().filter_map(|g| self.nodes.get(g)).collect()
    }

    /// Nodes with no edge in either direction.
    pub fn find_orphaned_nodes(&self) -> Vec<&GraphNode> {
        self.nodes
            .values()
            .filter(|n| {
                self.adjacency.get(&n.guid).is_none_or(Vec::is_empty)
                    && self.reverse.get(&n.guid).is_none_or(BTreeSet::is_empty)
            })
            .collect()
    }

    /// Directed cycles found by a DFS over every component. Each cycle is the
    /// recursion stack from the revisited node onwards.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut cycles = Vec::new();
        for guid in self.nodes.keys() {
            if !visited.contains(guid.as_str()) {
                let mut stack = Vec::new();
                self.visit(guid, &mut visited, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn visit<'a>(
        &'a self,
        guid: &'a str,
        visited: &mut BTreeSet<&'a str>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(guid);
        stack.push(guid);

        for edge in self.adjacency.get(guid).into_iter().flatten() {
            let next = edge.target.as_str();
            if let Some(pos) = stack.iter().position(|g| *g == next) {
                cycles.push(stack[pos..].iter().map(|g| g.to_string()).collect());
            } else if !visited.contains(next) {
                self.visit(next, visited, stack, cycles);
            }
        }

        stack.pop();
    }

    pub fn get_stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edge_count(),
            orphaned_nodes: self.find_orphaned_nodes().len(),
            cycles: self.detect_cycles().len(),
            ..Default::default()
        };
        for node in self.nodes.values() {
            *stats.nodes_by_type.entry(node.entity_type).or_insert(0) += 1;
        }
        for edge in self.adjacency.values().flatten() {
            *stats.edges_by_type.entry(edge.relationship_type).or_insert(0) += 1;
        }
        stats
    }

    pub fn export_graph(&self) -> GraphExport {
        GraphExport {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.adjacency.values().flatten().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NamespacedMetrics;
    use crate::models::RecordMetadata;
    use chrono::Utc;

    fn entity(entity_type: EntityType, guid: &str, edges: Vec<RelationshipEdge>) -> SynthesizedEntity {
        SynthesizedEntity::new(
            entity_type,
            guid.to_string(),
            guid.to_string(),
            "prod".to_string(),
            BTreeMap::new(),
            Utc::now(),
            NamespacedMetrics::default(),
            RecordMetadata::default(),
            edges,
        )
    }

    fn produces(from: &str, to: &str) -> RelationshipEdge {
        RelationshipEdge::new(RelationshipType::ProducesTo, from, to)
    }

    #[test]
    fn test_explicit_edges_need_both_endpoints() {
        let mut graph = RelationshipGraphBuilder::new();
        graph.build_graph(&[
            entity(EntityType::ConsumerGroup, "a", vec![produces("a", "b"), produces("a", "missing")]),
            entity(EntityType::Topic, "b", vec![]),
        ]);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dropped_edges(), 1);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = RelationshipGraphBuilder::new();
        graph.build_graph(&[
            entity(EntityType::ConsumerGroup, "a", vec![produces("a", "b"), produces("a", "b")]),
            entity(EntityType::Topic, "b", vec![]),
        ]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_related_entities_both_directions() {
        let mut graph = RelationshipGraphBuilder::new();
        graph.build_graph(&[
            entity(EntityType::ConsumerGroup, "a", vec![produces("a", "b")]),
            entity(EntityType::Topic, "b", vec![]),
            entity(EntityType::ConsumerGroup, "c", vec![produces("c", "b")]),
        ]);

        let related: Vec<_> = graph
            .get_related_entities("b", None)
            .into_iter()
            .map(|n| n.guid.as_str())
            .collect();
        assert_eq!(related, vec!["a", "c"]);

        assert!(graph
            .get_related_entities("b", Some(RelationshipType::ConsumesFrom))
            .is_empty());
        assert_eq!(graph.get_relationships("b").len(), 2);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = RelationshipGraphBuilder::new();
        graph.build_graph(&[entity(EntityType::Topic, "a", vec![produces("a", "a")])]);
        assert_eq!(graph.detect_cycles(), vec![vec!["a".to_string()]]);
        assert_eq!(graph.get_relationships("a").len(), 1);
        assert_eq!(graph.get_related_entities("a", None).len(), 1);
    }

    #[test]
    fn test_stats_by_type() {
        let mut graph = RelationshipGraphBuilder::new();
        graph.build_graph(&[
            entity(EntityType::Cluster, "cluster", vec![]),
            entity(EntityType::Broker, "b1", vec![]),
            entity(EntityType::Broker, "b2", vec![]),
        ]);
        let stats = graph.get_stats();

        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.nodes_by_type.get(&EntityType::Broker), Some(&2));
        assert_eq!(stats.edges_by_type.get(&RelationshipType::ContainedIn), Some(&2));
        assert_eq!(stats.orphaned_nodes, 0);
        assert_eq!(stats.cycles, 0);
    }
}
