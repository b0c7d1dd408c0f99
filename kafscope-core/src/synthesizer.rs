//! Canonical record -> monitoring entity with a deterministic GUID.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::entity::{NamespacedMetrics, RelationshipEdge, RelationshipType, SynthesizedEntity};
use crate::error::{PipelineError, Result};
use crate::models::{CanonicalRecord, EntityType};

/// Fixed identity fields stamped on every entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizerConfig {
    pub account_id: String,
    pub provider: String,
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisStats {
    pub by_type: BTreeMap<EntityType, u64>,
    pub errors: u64,
    /// Metrics dropped by name or namespace validation.
    pub rejected_metrics: u64,
}

impl SynthesisStats {
    pub fn total(&self) -> u64 {
        self.by_type.values().sum()
    }
}

pub struct EntitySynthesizer {
    config: SynthesizerConfig,
    stats: SynthesisStats,
}

/// GUID for an entity: `{accountId}|{provider}|{clusterName}|{identifier}`,
/// empty components left out.
///
/// `identifier` is the broker id, topic name or group name, empty for clusters.
pub fn entity_guid(account_id: &str, provider: &str, cluster_name: &str, identifier: &str) -> String {
    [account_id, provider, cluster_name, identifier]
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("|")
}

impl EntitySynthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self {
            config,
            stats: SynthesisStats::default(),
        }
    }

    pub fn stats(&self) -> &SynthesisStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SynthesisStats::default();
    }

    /// GUID another entity of `entity_type` in `cluster_name` would get.
    pub fn guid_for(&self, provider: &str, cluster_name: &str, entity_type: EntityType, id: Option<&str>) -> String {
        let identifier = match entity_type {
            EntityType::Cluster => "",
            _ => id.unwrap_or_default(),
        };
        entity_guid(&self.config.account_id, provider, cluster_name, identifier)
    }

    pub fn synthesize(&mut self, record: &CanonicalRecord) -> Result<SynthesizedEntity> {
        let outcome = self.build(record);
        self.count(outcome)
    }

    /// Synthesizes every record, skipping (and counting) the failures.
    ///
    /// Within one batch a GUID belongs to the first entity type that got it:
    /// a topic and a consumer group both named `billing` would share one, so
    /// the later record is rejected as `InvalidRecord`.
    pub fn synthesize_all(&mut self, records: &[CanonicalRecord]) -> Vec<SynthesizedEntity> {
        let mut owners: HashMap<String, EntityType> = HashMap::new();
        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let outcome = self.build(record).and_then(|entity| match owners.get(entity.guid()) {
                Some(owner) if *owner != entity.entity_type() => Err(PipelineError::invalid_record(
                    entity.entity_type().tag(),
                    format!("GUID '{}' already belongs to a {} entity", entity.guid(), owner.tag()),
                )),
                _ => Ok(entity),
            });
            match self.count(outcome) {
                Ok(entity) => {
                    owners.insert(entity.guid().to_string(), entity.entity_type());
                    entities.push(entity);
                }
                Err(e) => tracing::warn!(record = %record.label(), error = %e, "synthesis failed"),
            }
        }
        entities
    }

    fn count(&mut self, outcome: Result<SynthesizedEntity>) -> Result<SynthesizedEntity> {
        match &outcome {
            Ok(entity) => *self.stats.by_type.entry(entity.entity_type()).or_insert(0) += 1,
            Err(_) => self.stats.errors += 1,
        }
        outcome
    }

    fn build(&mut self, record: &CanonicalRecord) -> Result<SynthesizedEntity> {
        let entity_type = record.validate()?;
        let provider = record.provider.as_deref().unwrap_or(&self.config.provider);
        let id = record.identifier(entity_type);

        for component in [self.config.account_id.as_str(), provider, record.cluster_name.as_str()]
            .into_iter()
            .chain(id)
        {
            if component.contains('|') {
                return Err(PipelineError::invalid_record(
                    entity_type.tag(),
                    format!("'{component}' contains the GUID separator '|'"),
                ));
            }
        }

        let guid = self.guid_for(provider, &record.cluster_name, entity_type, id);
        let display_name = match (entity_type, id) {
            (EntityType::Broker, Some(id)) => format!("{}-broker-{}", record.cluster_name, id),
            (EntityType::Cluster, _) | (_, None) => record.cluster_name.clone(),
            (_, Some(id)) => id.to_string(),
        };

        let mut tags = BTreeMap::new();
        tags.insert("provider".to_string(), provider.to_string());
        tags.insert("clusterName".to_string(), record.cluster_name.clone());
        tags.insert("environment".to_string(), self.config.environment.clone());
        let id_tag = match entity_type {
            EntityType::Broker => Some("brokerId"),
            EntityType::Topic => Some("topicName"),
            EntityType::ConsumerGroup => Some("consumerGroup"),
            EntityType::Cluster => None,
        };
        if let (Some(key), Some(id)) = (id_tag, id) {
            tags.insert(key.to_string(), id.to_string());
        }
        if let Some(host) = &record.metadata.host {
            tags.insert("host".to_string(), host.clone());
        }

        let (metrics, rejected) = NamespacedMetrics::from_record(entity_type, &record.metrics);
        if !rejected.is_empty() {
            tracing::debug!(record = %record.label(), ?rejected, "metrics dropped");
            self.stats.rejected_metrics += rejected.len() as u64;
        }

        let relationships = self.explicit_edges(record, entity_type, provider, &guid);

        Ok(SynthesizedEntity::new(
            entity_type,
            guid,
            display_name,
            record.cluster_name.clone(),
            tags,
            record.timestamp,
            metrics,
            record.metadata.clone(),
            relationships,
        ))
    }

    fn explicit_edges(
        &self,
        record: &CanonicalRecord,
        entity_type: EntityType,
        provider: &str,
        guid: &str,
    ) -> Vec<RelationshipEdge> {
        let cluster = &record.cluster_name;
        let mut edges = Vec::new();

        if entity_type == EntityType::Broker && record.metadata.is_controller {
            edges.push(RelationshipEdge::new(
                RelationshipType::Manages,
                guid,
                self.guid_for(provider, cluster, EntityType::Cluster, None),
            ));
        }

        // Edges run broker -> topic; the topic record carries them.
        if entity_type == EntityType::Topic {
            for broker_id in &record.metadata.brokers {
                edges.push(RelationshipEdge::new(
                    RelationshipType::Hosts,
                    self.guid_for(provider, cluster, EntityType::Broker, Some(broker_id)),
                    guid,
                ));
            }
        }

        for declared in &record.metadata.relationships {
            let target_id = (declared.target_type != EntityType::Cluster).then_some(declared.target_id.as_str());
            edges.push(RelationshipEdge::new(
                declared.relationship_type,
                guid,
                self.guid_for(provider, cluster, declared.target_type, target_id),
            ));
        }

        edges
    }
}
