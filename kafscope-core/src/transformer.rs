//! Optional rewrite of canonical records into an alternate provider schema,
//! with fallback to the untouched record on any failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{PipelineError, Result};
use crate::models::{CanonicalRecord, EntityType};

/// A schema records can be rewritten into.
pub trait AlternateSchema: Send + Sync {
    fn name(&self) -> &str;

    fn rewrite(&self, record: &CanonicalRecord) -> Result<CanonicalRecord>;
}

/// Which form [`CompatibilityTransformer::transform`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Alternate(CanonicalRecord),
    Canonical(CanonicalRecord),
}

impl TransformOutcome {
    pub fn into_record(self) -> CanonicalRecord {
        match self {
            TransformOutcome::Alternate(r) | TransformOutcome::Canonical(r) => r,
        }
    }

    pub fn is_alternate(&self) -> bool {
        matches!(self, TransformOutcome::Alternate(_))
    }
}

pub struct CompatibilityTransformer {
    enabled: bool,
    schema: Box<dyn AlternateSchema>,
    fallbacks: AtomicU64,
}

impl CompatibilityTransformer {
    pub fn new(enabled: bool, schema: Box<dyn AlternateSchema>) -> Self {
        Self {
            enabled,
            schema,
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Box::new(MskSchema::default()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Never fails: a rewrite error is logged, counted and the input
    /// record comes back unchanged.
    pub fn transform(&self, record: CanonicalRecord) -> TransformOutcome {
        if !self.enabled {
            return TransformOutcome::Canonical(record);
        }
        match self.schema.rewrite(&record) {
            Ok(rewritten) => TransformOutcome::Alternate(rewritten),
            Err(e) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    schema = self.schema.name(),
                    record = %record.label(),
                    error = %e,
                    "alternate schema failed, keeping canonical record"
                );
                TransformOutcome::Canonical(record)
            }
        }
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

/// Broker metric -> MSK provider metric.
const MSK_BROKER_METRICS: &[(&str, &str)] = &[
    ("bytesInPerSecond", "provider.bytesInPerSec.Average"),
    ("bytesOutPerSecond", "provider.bytesOutPerSec.Average"),
    ("messagesInPerSecond", "provider.messagesInPerSec.Average"),
    ("totalFetchRequestsPerSecond", "provider.fetchRequestsPerSec.Average"),
    ("totalProduceRequestsPerSecond", "provider.produceRequestsPerSec.Average"),
    ("underReplicatedPartitions", "provider.underReplicatedPartitions.Maximum"),
    ("partitionCount", "provider.partitionCount.Maximum"),
    ("leaderCount", "provider.leaderCount.Maximum"),
    ("activeControllerCount", "provider.activeControllerCount.Sum"),
    ("offlinePartitionsCount", "provider.offlinePartitionsCount.Sum"),
    ("isrShrinksPerSecond", "provider.isrShrinksPerSec.Average"),
    ("isrExpandsPerSecond", "provider.isrExpandsPerSec.Average"),
    ("requestHandlerAvgIdlePercent", "provider.requestHandlerAvgIdlePercent.Average"),
    ("networkProcessorAvgIdlePercent", "provider.networkProcessorAvgIdlePercent.Average"),
    ("produceRequestTimeMs", "provider.produceTotalTimeMsMean.Average"),
    ("fetchConsumerRequestTimeMs", "provider.fetchConsumerTotalTimeMsMean.Average"),
];

const MSK_TOPIC_METRICS: &[(&str, &str)] = &[
    ("bytesInPerSecond", "provider.bytesInPerSec.Sum"),
    ("bytesOutPerSecond", "provider.bytesOutPerSec.Sum"),
    ("messagesInPerSecond", "provider.messagesInPerSec.Sum"),
    ("bytesRejectedPerSecond", "provider.bytesRejectedPerSec.Sum"),
    ("sumOffsetLag", "provider.sumOffsetLag.Sum"),
    ("maxOffsetLag", "provider.maxOffsetLag.Maximum"),
];

const MSK_CLUSTER_METRICS: &[(&str, &str)] = &[
    ("brokerCount", "provider.brokerCount"),
    ("topicCount", "provider.topicCount"),
    ("partitionCount", "provider.globalPartitionCount.Average"),
    ("activeControllerCount", "provider.activeControllerCount.Sum"),
    ("offlinePartitionsCount", "provider.offlinePartitionsCount.Sum"),
    ("underReplicatedPartitions", "provider.underReplicatedPartitions.Sum"),
    ("bytesInPerSecond", "provider.bytesInPerSec.Sum"),
    ("bytesOutPerSecond", "provider.bytesOutPerSec.Sum"),
];

const MSK_CONSUMER_GROUP_METRICS: &[(&str, &str)] = &[
    ("totalLag", "provider.sumOffsetLag.Sum"),
    ("maxLag", "provider.maxOffsetLag.Maximum"),
    ("topicCount", "provider.topicCount"),
];

/// AWS MSK provider schema.
pub struct MskSchema {
    provider: String,
}

impl MskSchema {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl Default for MskSchema {
    fn default() -> Self {
        Self::new("AWS_MSK")
    }
}

impl AlternateSchema for MskSchema {
    fn name(&self) -> &str {
        "msk"
    }

    fn rewrite(&self, record: &CanonicalRecord) -> Result<CanonicalRecord> {
        let entity_type: EntityType = record
            .entity_type
            .parse()
            .map_err(|e: PipelineError| PipelineError::transformation(record.label(), e))?;

        let table = match entity_type {
            EntityType::Broker => {
                // MSK identifie les brokers par un entier
                let id = record.broker_id.as_deref().unwrap_or_default();
                if id.parse::<u32>().is_err() {
                    return Err(PipelineError::transformation(
                        record.label(),
                        format!("broker id '{id}' is not numeric"),
                    ));
                }
                MSK_BROKER_METRICS
            }
            EntityType::Topic => MSK_TOPIC_METRICS,
            EntityType::ConsumerGroup => MSK_CONSUMER_GROUP_METRICS,
            EntityType::Cluster => MSK_CLUSTER_METRICS,
        };

        let metrics: BTreeMap<String, f64> = table
            .iter()
            .filter_map(|(from, to)| record.metrics.get(*from).map(|v| ((*to).to_string(), *v)))
            .collect();
        if metrics.is_empty() && !record.metrics.is_empty() {
            return Err(PipelineError::transformation(
                record.label(),
                "no metric maps to the provider schema",
            ));
        }

        let mut rewritten = record.clone();
        rewritten.metrics = metrics;
        rewritten.provider = Some(self.provider.clone());
        Ok(rewritten)
    }
}
