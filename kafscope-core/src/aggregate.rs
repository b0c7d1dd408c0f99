//! Turns one cycle's broker collections into canonical records: one per
//! broker, one per topic, one per consumer group and one for the cluster.

use std::collections::{BTreeMap, BTreeSet};

use crate::collector::BrokerCollection;
use crate::models::{CanonicalRecord, ConsumerGroupDescriptor};

/// Broker metrics summed into the cluster record.
const CLUSTER_SUMS: &[&str] = &[
    "bytesInPerSecond",
    "bytesOutPerSecond",
    "messagesInPerSecond",
    "partitionCount",
    "underReplicatedPartitions",
    "activeControllerCount",
];

pub fn broker_records(collections: &[BrokerCollection], cluster_name: &str) -> Vec<CanonicalRecord> {
    collections
        .iter()
        .map(|c| c.broker_record(cluster_name))
        .collect()
}

/// Sums each topic's rates across the brokers that reported it.
pub fn topic_records(collections: &[BrokerCollection], cluster_name: &str) -> Vec<CanonicalRecord> {
    let mut topics: BTreeMap<String, (BTreeMap<String, f64>, BTreeSet<String>)> = BTreeMap::new();

    for collection in collections {
        for (topic, metrics) in collection.topic_metrics() {
            let (sums, brokers) = topics.entry(topic).or_default();
            // Sans métrique le broker n'héberge pas le topic
            if metrics.is_empty() {
                continue;
            }
            brokers.insert(collection.broker.id.clone());
            for (name, value) in metrics {
                *sums.entry(name).or_insert(0.0) += value;
            }
        }
    }

    topics
        .into_iter()
        .map(|(topic, (metrics, brokers))| {
            let mut record = CanonicalRecord::topic(cluster_name, topic);
            record.metrics = metrics;
            record.metadata.brokers = brokers.into_iter().collect();
            record
        })
        .collect()
}

pub fn consumer_group_records(
    groups: &[ConsumerGroupDescriptor],
    cluster_name: &str,
) -> Vec<CanonicalRecord> {
    groups
        .iter()
        .map(|group| {
            let mut record = CanonicalRecord::consumer_group(cluster_name, group.name.clone());
            let total: f64 = group.lag.values().sum();
            let max = group.lag.values().copied().fold(0.0, f64::max);
            record.metrics.insert("totalLag".into(), total);
            record.metrics.insert("maxLag".into(), max);
            record
                .metrics
                .insert("topicCount".into(), group.topics.len() as f64);
            record.metadata.topics = group.topics.clone();
            record
        })
        .collect()
}

/// Folds consumer lag into the collected topic records: `sumOffsetLag` over
/// the groups reading the topic, `maxOffsetLag` the worst of them. Lag on a
/// topic that was not collected is left on the group record only.
pub fn attach_topic_lag(topics: &mut [CanonicalRecord], groups: &[ConsumerGroupDescriptor]) {
    let mut lag_by_topic: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for group in groups {
        for (topic, lag) in &group.lag {
            let (sum, max) = lag_by_topic.entry(topic.as_str()).or_insert((0.0, 0.0));
            *sum += lag;
            *max = max.max(*lag);
        }
    }

    for record in topics.iter_mut() {
        let Some((sum, max)) = record
            .topic_name
            .as_deref()
            .and_then(|name| lag_by_topic.get(name).copied())
        else {
            continue;
        };
        record.metrics.insert("sumOffsetLag".into(), sum);
        record.metrics.insert("maxOffsetLag".into(), max);
    }
}

/// Cluster-wide rollup of the broker and topic records.
pub fn cluster_record(
    brokers: &[CanonicalRecord],
    topic_count: usize,
    cluster_name: &str,
) -> CanonicalRecord {
    let mut record = CanonicalRecord::cluster(cluster_name);

    for name in CLUSTER_SUMS {
        let total: f64 = brokers.iter().filter_map(|b| b.metrics.get(*name)).sum();
        record.metrics.insert((*name).to_string(), total);
    }
    let offline = brokers
        .iter()
        .filter_map(|b| b.metrics.get("offlinePartitionsCount").copied())
        .fold(0.0, f64::max);
    record.metrics.insert("offlinePartitionsCount".into(), offline);
    record.metrics.insert("brokerCount".into(), brokers.len() as f64);
    record.metrics.insert("topicCount".into(), topic_count as f64);

    record
}

/// All records for one cycle, brokers first and the cluster last.
pub fn cycle_records(
    collections: &[BrokerCollection],
    groups: &[ConsumerGroupDescriptor],
    cluster_name: &str,
) -> Vec<CanonicalRecord> {
    let brokers = broker_records(collections, cluster_name);
    let mut topics = topic_records(collections, cluster_name);
    attach_topic_lag(&mut topics, groups);
    let cluster = cluster_record(&brokers, topics.len(), cluster_name);

    let mut records = brokers;
    records.extend(topics);
    records.extend(consumer_group_records(groups, cluster_name));
    records.push(cluster);
    records
}
