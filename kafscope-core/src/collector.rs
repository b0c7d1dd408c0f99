//! Per-broker metric collection over a monitoring connection.
//!
//! The collector knows which beans to read; the protocol lives behind
//! [`MonitoringProvider`] / [`MonitoringConnection`] (see `jolokia.rs`).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::error::{PipelineError, Result};
use crate::models::{BeanAttributes, BrokerDescriptor, CanonicalRecord, RawSample, SampleScope};

/// Opens monitoring connections to brokers.
#[async_trait]
pub trait MonitoringProvider: Send + Sync {
    async fn connect(&self, broker: &BrokerDescriptor) -> Result<Box<dyn MonitoringConnection>>;
}

/// One open connection to a broker's monitoring endpoint.
#[async_trait]
pub trait MonitoringConnection: Send + Sync {
    /// Reads every attribute of `bean`. A bean the broker does not register
    /// comes back as an empty map.
    async fn query(&self, bean: &str) -> Result<BeanAttributes>;

    async fn close(&self);
}

/// Maps one bean attribute to a record metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub bean: &'static str,
    pub attribute: &'static str,
}

const fn def(name: &'static str, bean: &'static str, attribute: &'static str) -> MetricDefinition {
    MetricDefinition {
        name,
        bean,
        attribute,
    }
}

const RATE: &str = "OneMinuteRate";
const GAUGE: &str = "Value";
const MEAN: &str = "Mean";

pub const BROKER_METRICS: &[MetricDefinition] = &[
    def("bytesInPerSecond", "kafka.server:type=BrokerTopicMetrics,name=BytesInPerSec", RATE),
    def("bytesOutPerSecond", "kafka.server:type=BrokerTopicMetrics,name=BytesOutPerSec", RATE),
    def("messagesInPerSecond", "kafka.server:type=BrokerTopicMetrics,name=MessagesInPerSec", RATE),
    def("totalFetchRequestsPerSecond", "kafka.server:type=BrokerTopicMetrics,name=TotalFetchRequestsPerSec", RATE),
    def("totalProduceRequestsPerSecond", "kafka.server:type=BrokerTopicMetrics,name=TotalProduceRequestsPerSec", RATE),
    def("failedFetchRequestsPerSecond", "kafka.server:type=BrokerTopicMetrics,name=FailedFetchRequestsPerSec", RATE),
    def("failedProduceRequestsPerSecond", "kafka.server:type=BrokerTopicMetrics,name=FailedProduceRequestsPerSec", RATE),
    def("replicationBytesInPerSecond", "kafka.server:type=BrokerTopicMetrics,name=ReplicationBytesInPerSec", RATE),
    def("replicationBytesOutPerSecond", "kafka.server:type=BrokerTopicMetrics,name=ReplicationBytesOutPerSec", RATE),
    def("isrExpandsPerSecond", "kafka.server:type=ReplicaManager,name=IsrExpandsPerSec", RATE),
    def("isrShrinksPerSecond", "kafka.server:type=ReplicaManager,name=IsrShrinksPerSec", RATE),
    def("leaderCount", "kafka.server:type=ReplicaManager,name=LeaderCount", GAUGE),
    def("partitionCount", "kafka.server:type=ReplicaManager,name=PartitionCount", GAUGE),
    def("underReplicatedPartitions", "kafka.server:type=ReplicaManager,name=UnderReplicatedPartitions", GAUGE),
    def("activeControllerCount", "kafka.controller:type=KafkaController,name=ActiveControllerCount", GAUGE),
    def("offlinePartitionsCount", "kafka.controller:type=KafkaController,name=OfflinePartitionsCount", GAUGE),
    def("requestHandlerAvgIdlePercent", "kafka.server:type=KafkaRequestHandlerPool,name=RequestHandlerAvgIdlePercent", RATE),
    def("networkProcessorAvgIdlePercent", "kafka.network:type=SocketServer,name=NetworkProcessorAvgIdlePercent", GAUGE),
    def("produceRequestTimeMs", "kafka.network:type=RequestMetrics,name=TotalTimeMs,request=Produce", MEAN),
    def("fetchConsumerRequestTimeMs", "kafka.network:type=RequestMetrics,name=TotalTimeMs,request=FetchConsumer", MEAN),
];

/// Topic beans; the topic key is appended per topic (`,topic=<name>`).
pub const TOPIC_METRICS: &[MetricDefinition] = &[
    def("bytesInPerSecond", "kafka.server:type=BrokerTopicMetrics,name=BytesInPerSec", RATE),
    def("bytesOutPerSecond", "kafka.server:type=BrokerTopicMetrics,name=BytesOutPerSec", RATE),
    def("messagesInPerSecond", "kafka.server:type=BrokerTopicMetrics,name=MessagesInPerSec", RATE),
    def("bytesRejectedPerSecond", "kafka.server:type=BrokerTopicMetrics,name=BytesRejectedPerSec", RATE),
];

pub fn topic_bean(definition: &MetricDefinition, topic: &str) -> String {
    format!("{},topic={}", definition.bean, topic)
}

/// Everything read from one broker in one cycle.
#[derive(Debug, Clone)]
pub struct BrokerCollection {
    pub broker: BrokerDescriptor,
    pub broker_sample: RawSample,
    pub topic_samples: Vec<RawSample>,
}

impl BrokerCollection {
    /// Normalizes the broker sample into a `broker` record.
    pub fn broker_record(&self, cluster_name: &str) -> CanonicalRecord {
        let mut record = CanonicalRecord::broker(cluster_name, self.broker.id.clone());
        record.timestamp = self.broker_sample.collected_at;
        for definition in BROKER_METRICS {
            if let Some(value) = self.broker_sample.value(definition.bean, definition.attribute) {
                record.metrics.insert(definition.name.to_string(), value);
            }
        }
        record.metadata.host = Some(self.broker.host.clone());
        record.metadata.is_controller = record
            .metrics
            .get("activeControllerCount")
            .is_some_and(|count| *count >= 1.0);
        record
    }

    /// Per-topic metrics as seen by this broker, keyed by topic name.
    pub fn topic_metrics(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        for sample in &self.topic_samples {
            let SampleScope::Topic { topic, .. } = &sample.scope else {
                continue;
            };
            let metrics: BTreeMap<String, f64> = TOPIC_METRICS
                .iter()
                .filter_map(|definition| {
                    sample
                        .value(&topic_bean(definition, topic), definition.attribute)
                        .map(|v| (definition.name.to_string(), v))
                })
                .collect();
            out.insert(topic.clone(), metrics);
        }
        out
    }
}

/// Reads the broker (and optionally topic) bean tables from one broker.
pub struct MetricCollector {
    provider: Arc<dyn MonitoringProvider>,
    topics: Vec<String>,
    collect_topics: bool,
    timeout: Duration,
}

impl MetricCollector {
    pub fn new(provider: Arc<dyn MonitoringProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            topics: Vec::new(),
            collect_topics: false,
            timeout,
        }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.collect_topics = !topics.is_empty();
        self.topics = topics;
        self
    }

    /// Collects one broker. The whole call, connect included, shares a single
    /// deadline; the connection is closed on every path once opened.
    pub async fn collect(&self, broker: &BrokerDescriptor) -> Result<BrokerCollection> {
        let deadline = Instant::now() + self.timeout;

        let connection = match timeout_at(deadline, self.provider.connect(broker)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PipelineError::connection(
                    &broker.id,
                    format!("connect timed out after {:?}", self.timeout),
                ))
            }
        };

        let result = match timeout_at(deadline, self.read_all(broker, connection.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::connection(
                &broker.id,
                format!("collection timed out after {:?}", self.timeout),
            )),
        };

        connection.close().await;
        result
    }

    async fn read_all(
        &self,
        broker: &BrokerDescriptor,
        connection: &dyn MonitoringConnection,
    ) -> Result<BrokerCollection> {
        let mut broker_sample = RawSample::new(SampleScope::Broker {
            broker_id: broker.id.clone(),
        });
        for definition in BROKER_METRICS {
            if broker_sample.beans.contains_key(definition.bean) {
                continue;
            }
            let attributes = connection.query(definition.bean).await?;
            broker_sample.beans.insert(definition.bean.to_string(), attributes);
        }

        let mut topic_samples = Vec::new();
        if self.collect_topics {
            for topic in &self.topics {
                let mut sample = RawSample::new(SampleScope::Topic {
                    broker_id: broker.id.clone(),
                    topic: topic.clone(),
                });
                for definition in TOPIC_METRICS {
                    let bean = topic_bean(definition, topic);
                    let attributes = connection.query(&bean).await?;
                    sample.beans.insert(bean, attributes);
                }
                topic_samples.push(sample);
            }
        }

        tracing::debug!(
            broker_id = %broker.id,
            beans = broker_sample.beans.len(),
            topics = topic_samples.len(),
            "broker collected"
        );

        Ok(BrokerCollection {
            broker: broker.clone(),
            broker_sample,
            topic_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        beans: BTreeMap<String, BeanAttributes>,
        stall: bool,
        closed: Arc<AtomicUsize>,
    }

    struct FakeConnection {
        beans: BTreeMap<String, BeanAttributes>,
        stall: bool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MonitoringProvider for FakeProvider {
        async fn connect(&self, _broker: &BrokerDescriptor) -> Result<Box<dyn MonitoringConnection>> {
            Ok(Box::new(FakeConnection {
                beans: self.beans.clone(),
                stall: self.stall,
                closed: self.closed.clone(),
            }))
        }
    }

    #[async_trait]
    impl MonitoringConnection for FakeConnection {
        async fn query(&self, bean: &str) -> Result<BeanAttributes> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(self.beans.get(bean).cloned().unwrap_or_default())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gauge(value: f64) -> BeanAttributes {
        let mut attrs = BeanAttributes::new();
        attrs.insert("Value".into(), AttributeValue::Number(value));
        attrs
    }

    fn provider(stall: bool) -> (Arc<FakeProvider>, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut beans = BTreeMap::new();
        beans.insert(
            "kafka.controller:type=KafkaController,name=ActiveControllerCount".to_string(),
            gauge(1.0),
        );
        beans.insert(
            "kafka.server:type=ReplicaManager,name=PartitionCount".to_string(),
            gauge(42.0),
        );
        let mut rate = BeanAttributes::new();
        rate.insert("OneMinuteRate".into(), AttributeValue::Number(512.0));
        beans.insert(
            "kafka.server:type=BrokerTopicMetrics,name=BytesInPerSec,topic=orders".to_string(),
            rate,
        );
        (
            Arc::new(FakeProvider {
                beans,
                stall,
                closed: closed.clone(),
            }),
            closed,
        )
    }

    #[tokio::test]
    async fn test_collect_normalizes_broker_record() {
        let (provider, closed) = provider(false);
        let collector = MetricCollector::new(provider, Duration::from_secs(5));
        let broker = BrokerDescriptor::new("1", "kafka-1", 8778);

        let collection = collector.collect(&broker).await.unwrap();
        let record = collection.broker_record("prod");

        assert_eq!(record.broker_id.as_deref(), Some("1"));
        assert_eq!(record.metrics.get("partitionCount"), Some(&42.0));
        assert!(record.metadata.is_controller);
        assert_eq!(record.metadata.host.as_deref(), Some("kafka-1"));
        // Beans the broker does not register leave no metric behind.
        assert!(!record.metrics.contains_key("bytesInPerSecond"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_topics() {
        let (provider, _) = provider(false);
        let collector = MetricCollector::new(provider, Duration::from_secs(5))
            .with_topics(vec!["orders".into()]);
        let broker = BrokerDescriptor::new("1", "kafka-1", 8778);

        let collection = collector.collect(&broker).await.unwrap();
        let topics = collection.topic_metrics();

        assert_eq!(topics["orders"].get("bytesInPerSecond"), Some(&512.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_still_closes_connection() {
        let (provider, closed) = provider(true);
        let collector = MetricCollector::new(provider, Duration::from_millis(100));
        let broker = BrokerDescriptor::new("7", "kafka-7", 8778);

        let err = collector.collect(&broker).await.unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
