//! Synthesized entities and the typed edges between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{EntityType, RecordMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    ContainedIn,
    ProducesTo,
    ConsumesFrom,
    Manages,
    Hosts,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::ContainedIn => "CONTAINED_IN",
            RelationshipType::ProducesTo => "PRODUCES_TO",
            RelationshipType::ConsumesFrom => "CONSUMES_FROM",
            RelationshipType::Manages => "MANAGES",
            RelationshipType::Hosts => "HOSTS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            RelationshipType::ContainedIn,
            RelationshipType::ProducesTo,
            RelationshipType::ConsumesFrom,
            RelationshipType::Manages,
            RelationshipType::Hosts,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two entity GUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEdge {
    pub relationship_type: RelationshipType,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl RelationshipEdge {
    pub fn new(
        relationship_type: RelationshipType,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            relationship_type,
            source: source.into(),
            target: target.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Same type and endpoints; attributes are ignored.
    pub fn same_link(&self, other: &RelationshipEdge) -> bool {
        self.relationship_type == other.relationship_type
            && self.source == other.source
            && self.target == other.target
    }
}

/// Entity metrics keyed `<entityType>.<name>`.
///
/// Only built through [`NamespacedMetrics::from_record`], which enforces the
/// namespace of the owning entity type and drops anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NamespacedMetrics(BTreeMap<String, f64>);

impl NamespacedMetrics {
    /// Namespaces `metrics` under `entity_type`. Returns the accepted map and
    /// the names that were rejected.
    pub fn from_record(
        entity_type: EntityType,
        metrics: &BTreeMap<String, f64>,
    ) -> (Self, Vec<String>) {
        let prefix = format!("{}.", entity_type.tag());
        let mut accepted = BTreeMap::new();
        let mut rejected = Vec::new();

        for (name, value) in metrics {
            // Already namespaced for this type: keep as is.
            let bare = name.strip_prefix(&prefix).unwrap_or(name);
            let foreign_namespace = EntityType::ALL
                .iter()
                .filter(|t| **t != entity_type)
                .any(|t| bare.starts_with(&format!("{}.", t.tag())));

            if foreign_namespace || !is_valid_metric_name(bare) || !value.is_finite() {
                rejected.push(name.clone());
                continue;
            }
            accepted.insert(format!("{prefix}{bare}"), *value);
        }

        (Self(accepted), rejected)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Monitoring entity produced once per cycle. Read-only after synthesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedEntity {
    entity_type: EntityType,
    guid: String,
    display_name: String,
    cluster_name: String,
    tags: BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
    metrics: NamespacedMetrics,
    metadata: RecordMetadata,
    relationships: Vec<RelationshipEdge>,
}

impl SynthesizedEntity {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entity_type: EntityType,
        guid: String,
        display_name: String,
        cluster_name: String,
        tags: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
        metrics: NamespacedMetrics,
        metadata: RecordMetadata,
        relationships: Vec<RelationshipEdge>,
    ) -> Self {
        Self {
            entity_type,
            guid,
            display_name,
            cluster_name,
            tags,
            timestamp,
            metrics,
            metadata,
            relationships,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metrics(&self) -> &NamespacedMetrics {
        &self.metrics
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn relationships(&self) -> &[RelationshipEdge] {
        &self.relationships
    }
}
