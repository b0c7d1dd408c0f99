//! Input and intermediate data shapes: broker inventory, raw monitoring
//! samples and canonical records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::entity::RelationshipType;
use crate::error::{PipelineError, Result};

/// Monitoring endpoint credentials for one broker.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One broker as reported by discovery. Never mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerDescriptor {
    pub id: String,
    pub host: String,
    pub monitoring_port: u16,
    #[serde(default)]
    pub credentials: Option<BrokerCredentials>,
}

impl BrokerDescriptor {
    pub fn new(id: impl Into<String>, host: impl Into<String>, monitoring_port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            monitoring_port,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(BrokerCredentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn monitoring_addr(&self) -> String {
        format!("{}:{}", self.host, self.monitoring_port)
    }
}

/// Consumer group as reported by discovery, with optional per-topic lag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroupDescriptor {
    pub name: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub lag: BTreeMap<String, f64>,
}

/// Everything one collection cycle works from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub brokers: Vec<BrokerDescriptor>,
    #[serde(default)]
    pub consumer_groups: Vec<ConsumerGroupDescriptor>,
}

/// Single attribute read from a monitoring bean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub type BeanAttributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleScope {
    Broker { broker_id: String },
    Topic { broker_id: String, topic: String },
}

impl SampleScope {
    pub fn broker_id(&self) -> &str {
        match self {
            SampleScope::Broker { broker_id } | SampleScope::Topic { broker_id, .. } => broker_id,
        }
    }
}

/// Bean name -> attributes, as returned by one broker's monitoring endpoint.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub scope: SampleScope,
    pub beans: BTreeMap<String, BeanAttributes>,
    pub collected_at: DateTime<Utc>,
}

impl RawSample {
    pub fn new(scope: SampleScope) -> Self {
        Self {
            scope,
            beans: BTreeMap::new(),
            collected_at: Utc::now(),
        }
    }

    /// Numeric value of `attribute` on `bean`, if present and numeric.
    pub fn value(&self, bean: &str, attribute: &str) -> Option<f64> {
        self.beans.get(bean)?.get(attribute)?.as_f64()
    }
}

/// The four entity variants the synthesizer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Broker,
    Topic,
    ConsumerGroup,
    Cluster,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Broker,
        EntityType::Topic,
        EntityType::ConsumerGroup,
        EntityType::Cluster,
    ];

    /// Record tag and metric namespace (`broker`, `consumerGroup`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            EntityType::Broker => "broker",
            EntityType::Topic => "topic",
            EntityType::ConsumerGroup => "consumerGroup",
            EntityType::Cluster => "cluster",
        }
    }

    /// Upper-case form used on the wire after the configured prefix.
    pub fn wire_name(&self) -> &'static str {
        match self {
            EntityType::Broker => "BROKER",
            EntityType::Topic => "TOPIC",
            EntityType::ConsumerGroup => "CONSUMER_GROUP",
            EntityType::Cluster => "CLUSTER",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EntityType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| PipelineError::UnknownEntityType(s.to_string()))
    }
}

/// Relationship declared by a record, resolved to GUIDs during synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredRelationship {
    pub relationship_type: RelationshipType,
    pub target_type: EntityType,
    pub target_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Subscribed topics (consumer groups).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    /// Brokers hosting the topic (topics).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub is_controller: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<DeclaredRelationship>,
}

/// Normalized record for one entity, before synthesis.
///
/// `entity_type` stays a string tag until synthesis so that records coming
/// from other producers can carry tags the synthesizer rejects.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub entity_type: String,
    pub cluster_name: String,
    pub broker_id: Option<String>,
    pub topic_name: Option<String>,
    pub consumer_group: Option<String>,
    /// Overrides the configured provider (set by the alternate schema).
    pub provider: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub metadata: RecordMetadata,
    pub timestamp: DateTime<Utc>,
}

impl CanonicalRecord {
    pub fn new(entity_type: EntityType, cluster_name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.tag().to_string(),
            cluster_name: cluster_name.into(),
            broker_id: None,
            topic_name: None,
            consumer_group: None,
            provider: None,
            metrics: BTreeMap::new(),
            metadata: RecordMetadata::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn broker(cluster_name: impl Into<String>, broker_id: impl Into<String>) -> Self {
        let mut record = Self::new(EntityType::Broker, cluster_name);
        record.broker_id = Some(broker_id.into());
        record
    }

    pub fn topic(cluster_name: impl Into<String>, topic_name: impl Into<String>) -> Self {
        let mut record = Self::new(EntityType::Topic, cluster_name);
        record.topic_name = Some(topic_name.into());
        record
    }

    pub fn consumer_group(cluster_name: impl Into<String>, group: impl Into<String>) -> Self {
        let mut record = Self::new(EntityType::ConsumerGroup, cluster_name);
        record.consumer_group = Some(group.into());
        record
    }

    pub fn cluster(cluster_name: impl Into<String>) -> Self {
        Self::new(EntityType::Cluster, cluster_name)
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identifier required by `entity_type`, or `None` for clusters.
    pub fn identifier(&self, entity_type: EntityType) -> Option<&str> {
        match entity_type {
            EntityType::Broker => self.broker_id.as_deref(),
            EntityType::Topic => self.topic_name.as_deref(),
            EntityType::ConsumerGroup => self.consumer_group.as_deref(),
            EntityType::Cluster => None,
        }
    }

    /// Short human label used in logs.
    pub fn label(&self) -> String {
        let id = self
            .broker_id
            .as_deref()
            .or(self.topic_name.as_deref())
            .or(self.consumer_group.as_deref())
            .unwrap_or(&self.cluster_name);
        format!("{}:{}", self.entity_type, id)
    }

    /// Checks the identifier invariant for the record's type.
    pub fn validate(&self) -> Result<EntityType> {
        let entity_type: EntityType = self.entity_type.parse()?;
        if self.cluster_name.trim().is_empty() {
            return Err(PipelineError::invalid_record(
                entity_type.tag(),
                "cluster name is empty",
            ));
        }
        if entity_type != EntityType::Cluster {
            match self.identifier(entity_type) {
                Some(id) if !id.trim().is_empty() => {}
                _ => {
                    return Err(PipelineError::invalid_record(
                        entity_type.tag(),
                        format!("missing {} identifier", entity_type.tag()),
                    ))
                }
            }
        }
        Ok(entity_type)
    }
}
