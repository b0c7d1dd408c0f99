//! One collection cycle, end to end.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::aggregate;
use crate::collector::{MetricCollector, MonitoringProvider};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::graph::{GraphExport, GraphStats, RelationshipGraphBuilder};
use crate::models::Inventory;
use crate::pool::{feed_broker_pool, BrokerFailure, CollectionWorkerPool};
use crate::streamer::{IngestTransport, StreamStats, Streamer};
use crate::synthesizer::{EntitySynthesizer, SynthesisStats, SynthesizerConfig};
use crate::transformer::{CompatibilityTransformer, MskSchema};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub brokers_collected: usize,
    pub broker_failures: Vec<String>,
    pub crashed_workers: usize,
    pub records: usize,
    pub alternate_records: usize,
    pub transform_fallbacks: usize,
    pub entities: usize,
    pub synthesis: SynthesisStats,
    pub graph: GraphStats,
    pub stream: StreamStats,
    #[serde(skip)]
    pub egress_error: Option<PipelineError>,
}

impl CycleReport {
    pub fn delivered(&self) -> bool {
        self.egress_error.is_none()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    collector: Arc<MetricCollector>,
    transformer: CompatibilityTransformer,
    synthesizer: EntitySynthesizer,
    graph: RelationshipGraphBuilder,
    streamer: Streamer,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        provider: Arc<dyn MonitoringProvider>,
        transport: Arc<dyn IngestTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let mut collector = MetricCollector::new(provider, config.connection_timeout());
        if config.collect_topics {
            collector = collector.with_topics(config.topics.clone());
        }
        let transformer = CompatibilityTransformer::new(
            config.alternate_schema_enabled,
            Box::new(MskSchema::new(config.alternate_provider.clone())),
        );
        let synthesizer = EntitySynthesizer::new(SynthesizerConfig {
            account_id: config.account_id.clone(),
            provider: config.provider.clone(),
            environment: config.environment.clone(),
        });
        let streamer = Streamer::from_config(transport, &config);

        Ok(Self {
            collector: Arc::new(collector),
            transformer,
            synthesizer,
            graph: RelationshipGraphBuilder::new(),
            streamer,
            config,
        })
    }

    /// Swaps the transformer, e.g. to plug in another alternate schema.
    pub fn with_transformer(mut self, transformer: CompatibilityTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &RelationshipGraphBuilder {
        &self.graph
    }

    pub fn export_graph(&self) -> GraphExport {
        self.graph.export_graph()
    }

    /// Collect, transform, synthesize, build the graph, stream. Stage
    /// failures end up in the report; nothing here aborts the cycle.
    pub async fn run_cycle(&mut self, inventory: &Inventory) -> CycleReport {
        let cluster_name = self.config.cluster_name.clone();

        let (tx, rx) = mpsc::channel(self.config.pool_size.max(1) * 2);
        let handle = CollectionWorkerPool::start(self.config.pool_size, rx, self.collector.clone());
        feed_broker_pool(inventory.brokers.clone(), tx).await;
        let outcome = handle.wait().await;

        let records = aggregate::cycle_records(&outcome.collections, &inventory.consumer_groups, &cluster_name);
        let record_count = records.len();

        let fallbacks_before = self.transformer.fallbacks();
        let mut alternate_records = 0;
        let records: Vec<_> = records
            .into_iter()
            .map(|record| {
                let outcome = self.transformer.transform(record);
                if outcome.is_alternate() {
                    alternate_records += 1;
                }
                outcome.into_record()
            })
            .collect();
        let transform_fallbacks = (self.transformer.fallbacks() - fallbacks_before) as usize;

        self.synthesizer.reset_stats();
        let entities = self.synthesizer.synthesize_all(&records);

        // Barrière: le graphe ne voit que le cycle complet
        self.graph.build_graph(&entities);
        let graph = self.graph.get_stats();

        let stream_before = self.streamer.stats();
        let egress_error = self.streamer.stream(&entities).await.err();
        let stream_after = self.streamer.stats();
        let stream = StreamStats {
            entities_streamed: stream_after.entities_streamed - stream_before.entities_streamed,
            batches_sent: stream_after.batches_sent - stream_before.batches_sent,
            errors: stream_after.errors - stream_before.errors,
        };

        let report = CycleReport {
            brokers_collected: outcome.collections.len(),
            broker_failures: outcome.failures.iter().map(describe_failure).collect(),
            crashed_workers: outcome.crashed_workers,
            records: record_count,
            alternate_records,
            transform_fallbacks,
            entities: entities.len(),
            synthesis: self.synthesizer.stats().clone(),
            graph,
            stream,
            egress_error,
        };

        tracing::info!(
            brokers = report.brokers_collected,
            failed = report.broker_failures.len(),
            entities = report.entities,
            edges = report.graph.edge_count,
            delivered = report.delivered(),
            "cycle complete"
        );
        report
    }
}

fn describe_failure(failure: &BrokerFailure) -> String {
    format!("{}: {}", failure.broker_id, failure.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MonitoringConnection;
    use crate::models::{BeanAttributes, BrokerDescriptor, ConsumerGroupDescriptor};
    use crate::streamer::EntityPayload;
    use async_trait::async_trait;

    struct QuietConnection;

    #[async_trait]
    impl MonitoringConnection for QuietConnection {
        async fn query(&self, _bean: &str) -> Result<BeanAttributes> {
            Ok(BeanAttributes::new())
        }

        async fn close(&self) {}
    }

    struct QuietProvider;

    #[async_trait]
    impl MonitoringProvider for QuietProvider {
        async fn connect(&self, _broker: &BrokerDescriptor) -> Result<Box<dyn MonitoringConnection>> {
            Ok(Box::new(QuietConnection))
        }
    }

    struct Sink;

    #[async_trait]
    impl IngestTransport for Sink {
        async fn post_batch(&self, _batch: usize, _payloads: &[EntityPayload]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cycle_produces_cluster_graph() {
        let config = PipelineConfig {
            cluster_name: "prod".into(),
            account_id: "1".into(),
            pool_size: 2,
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(config, Arc::new(QuietProvider), Arc::new(Sink)).unwrap();
        let inventory = Inventory {
            brokers: vec![
                BrokerDescriptor::new("1", "kafka-1", 8778),
                BrokerDescriptor::new("2", "kafka-2", 8778),
            ],
            consumer_groups: vec![ConsumerGroupDescriptor {
                name: "billing".into(),
                ..Default::default()
            }],
        };

        let report = pipeline.run_cycle(&inventory).await;

        assert_eq!(report.brokers_collected, 2);
        // 2 brokers + 1 group + 1 cluster
        assert_eq!(report.entities, 4);
        assert_eq!(report.graph.edge_count, 3);
        assert_eq!(report.stream.entities_streamed, 4);
        assert!(report.delivered());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(Pipeline::new(config, Arc::new(QuietProvider), Arc::new(Sink)).is_err());
    }
}
