use kafscope_core::{CanonicalRecord, EntityType, PipelineError, SynthesizedEntity, Streamer};
use kafscope_devkit::fixtures::{synthesizer, CLUSTER};
use kafscope_devkit::RecordingTransport;
use std::collections::HashSet;
use std::sync::Arc;

fn topics(count: usize) -> Vec<SynthesizedEntity> {
    let mut synthesizer = synthesizer();
    (0..count)
        .map(|i| {
            let record = CanonicalRecord::topic(CLUSTER, format!("topic-{i:03}"))
                .with_metric("bytesInPerSecond", i as f64);
            synthesizer.synthesize(&record).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn batches_preserve_size_and_order() {
    let entities = topics(250);
    let transport = Arc::new(RecordingTransport::new());
    let mut streamer = Streamer::new(transport.clone(), 100);

    streamer.stream(&entities).await.unwrap();

    assert_eq!(transport.batch_sizes(), vec![100, 100, 50]);
    let sent = transport.guids();
    let expected: Vec<String> = entities.iter().map(|e| e.guid().to_string()).collect();
    assert_eq!(sent, expected);

    let stats = streamer.stats();
    assert_eq!(stats.entities_streamed, 250);
    assert_eq!(stats.batches_sent, 3);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn failed_batch_stops_the_stream() {
    let entities = topics(250);
    let transport = Arc::new(RecordingTransport::new().fail_on_call(1, 500));
    let mut streamer = Streamer::new(transport.clone(), 100);

    let err = streamer.stream(&entities).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Egress {
            batch: 1,
            status: Some(500),
            ..
        }
    ));
    // The first batch stays delivered, the third is never attempted.
    assert_eq!(transport.batch_sizes(), vec![100]);
    assert_eq!(transport.calls(), 2);
    assert_eq!(streamer.stats().errors, 1);
    assert_eq!(streamer.stats().entities_streamed, 100);
}

#[tokio::test]
async fn wire_payload_is_prefixed_and_namespaced() {
    let entities = topics(1);
    let transport = Arc::new(RecordingTransport::new());
    let mut streamer = Streamer::new(transport.clone(), 100);
    streamer.stream(&entities).await.unwrap();

    let payload = &transport.batches()[0][0];
    assert_eq!(payload.entity_type, format!("KAFKA_{}", EntityType::Topic.wire_name()));
    assert_eq!(payload.event_type, "MessageQueueSample");
    assert_eq!(payload.metrics.get("topic.bytesInPerSecond"), Some(&0.0));
    assert_eq!(payload.tags.get("topicName").map(String::as_str), Some("topic-000"));
}

#[test]
fn guids_are_deterministic_and_distinct() {
    let first: Vec<String> = topics(50).iter().map(|e| e.guid().to_string()).collect();
    let second: Vec<String> = topics(50).iter().map(|e| e.guid().to_string()).collect();
    assert_eq!(first, second);

    let unique: HashSet<&String> = first.iter().collect();
    assert_eq!(unique.len(), 50);
}
