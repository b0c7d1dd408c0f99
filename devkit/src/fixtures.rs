/*!
Fixtures et harness pour les tests du pipeline

- entités synthétisées prêtes à l'emploi (brokers, topics, groupes, cluster)
- inventaires de brokers
- `PipelineHarness`: pipeline complet branché sur les stubs
*/

use anyhow::{Context, Result};
use kafscope_core::models::{DeclaredRelationship, RecordMetadata};
use kafscope_core::{
    BrokerDescriptor, CanonicalRecord, ConsumerGroupDescriptor, EntitySynthesizer, EntityType, Inventory,
    Pipeline, PipelineConfig, RelationshipType, SynthesizedEntity, SynthesizerConfig,
};
use std::sync::Arc;

use crate::ingest_stub::RecordingTransport;
use crate::monitoring_stub::MockMonitoringProvider;

pub const ACCOUNT_ID: &str = "1000";
pub const CLUSTER: &str = "test-cluster";

/// Active les logs dans les tests (sans paniquer si déjà fait)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn synthesizer() -> EntitySynthesizer {
    EntitySynthesizer::new(SynthesizerConfig {
        account_id: ACCOUNT_ID.to_string(),
        provider: "KAFKA".to_string(),
        environment: "test".to_string(),
    })
}

/// Synthétise un record de fixture; un échec ici est un bug de la fixture
pub fn entity(record: CanonicalRecord) -> SynthesizedEntity {
    synthesizer()
        .synthesize(&record)
        .unwrap_or_else(|e| panic!("fixture record {} did not synthesize: {e}", record.label()))
}

pub fn broker_entity(cluster: &str, id: &str) -> SynthesizedEntity {
    entity(CanonicalRecord::broker(cluster, id).with_metric("bytesInPerSecond", 100.0))
}

pub fn topic_entity(cluster: &str, name: &str) -> SynthesizedEntity {
    entity(CanonicalRecord::topic(cluster, name))
}

pub fn cluster_entity(cluster: &str) -> SynthesizedEntity {
    entity(CanonicalRecord::cluster(cluster))
}

pub fn consumer_group_entity(cluster: &str, name: &str, topics: &[&str]) -> SynthesizedEntity {
    entity(
        CanonicalRecord::consumer_group(cluster, name).with_metadata(RecordMetadata {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }),
    )
}

/// Topic qui déclare une relation vers un autre topic du même cluster
pub fn linked_topic(cluster: &str, name: &str, relationship: RelationshipType, target: &str) -> SynthesizedEntity {
    entity(
        CanonicalRecord::topic(cluster, name).with_metadata(RecordMetadata {
            relationships: vec![DeclaredRelationship {
                relationship_type: relationship,
                target_type: EntityType::Topic,
                target_id: target.to_string(),
            }],
            ..Default::default()
        }),
    )
}

/// `count` brokers, ids "1".."count"
pub fn brokers(count: usize) -> Vec<BrokerDescriptor> {
    (1..=count)
        .map(|i| BrokerDescriptor::new(i.to_string(), format!("kafka-{i}.test"), 8778))
        .collect()
}

pub fn consumer_group(name: &str, topics: &[&str]) -> ConsumerGroupDescriptor {
    ConsumerGroupDescriptor {
        name: name.to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// Pipeline complet sur `MockMonitoringProvider` + `RecordingTransport`
pub struct PipelineHarness {
    pub provider: MockMonitoringProvider,
    pub transport: Arc<RecordingTransport>,
    pub pipeline: Pipeline,
}

impl PipelineHarness {
    pub fn new(config: PipelineConfig, provider: MockMonitoringProvider) -> Result<Self> {
        Self::with_transport(config, provider, RecordingTransport::new())
    }

    pub fn with_transport(
        config: PipelineConfig,
        provider: MockMonitoringProvider,
        transport: RecordingTransport,
    ) -> Result<Self> {
        init_tracing();
        let transport = Arc::new(transport);
        let pipeline = Pipeline::new(config, Arc::new(provider.clone()), transport.clone())
            .context("building test pipeline")?;
        Ok(Self {
            provider,
            transport,
            pipeline,
        })
    }

    /// Config de test: cluster et compte fixes
    pub fn config() -> PipelineConfig {
        PipelineConfig {
            cluster_name: CLUSTER.to_string(),
            account_id: ACCOUNT_ID.to_string(),
            pool_size: 3,
            connection_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    pub fn inventory(brokers: Vec<BrokerDescriptor>, groups: Vec<ConsumerGroupDescriptor>) -> Inventory {
        Inventory {
            brokers,
            consumer_groups: groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_entities() {
        let broker = broker_entity(CLUSTER, "1");
        assert_eq!(broker.guid(), "1000|KAFKA|test-cluster|1");

        let group = consumer_group_entity(CLUSTER, "billing", &["orders"]);
        assert_eq!(group.metadata().topics, vec!["orders"]);

        let linked = linked_topic(CLUSTER, "a", RelationshipType::ProducesTo, "b");
        assert_eq!(linked.relationships()[0].target, "1000|KAFKA|test-cluster|b");
    }

    #[test]
    fn test_harness_builds() {
        let harness = PipelineHarness::new(PipelineHarness::config(), MockMonitoringProvider::new()).unwrap();
        assert_eq!(harness.pipeline.config().cluster_name, CLUSTER);
    }
}
