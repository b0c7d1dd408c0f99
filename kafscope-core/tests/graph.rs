use kafscope_core::{RelationshipGraphBuilder, RelationshipType};
use kafscope_devkit::fixtures::{
    broker_entity, cluster_entity, consumer_group_entity, linked_topic, topic_entity, CLUSTER,
};

#[test]
fn brokers_are_contained_in_their_cluster() {
    let entities = vec![
        broker_entity(CLUSTER, "1"),
        broker_entity(CLUSTER, "2"),
        broker_entity(CLUSTER, "3"),
        cluster_entity(CLUSTER),
    ];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    let cluster_guid = entities[3].guid();
    let contained: Vec<_> = graph
        .export_graph()
        .edges
        .into_iter()
        .filter(|e| e.relationship_type == RelationshipType::ContainedIn)
        .collect();

    assert_eq!(contained.len(), 3);
    assert!(contained.iter().all(|e| e.target == cluster_guid));
    assert_eq!(
        graph
            .get_related_entities(cluster_guid, Some(RelationshipType::ContainedIn))
            .len(),
        3
    );
}

#[test]
fn other_cluster_is_not_a_container() {
    let entities = vec![broker_entity("east", "1"), cluster_entity("west")];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.find_orphaned_nodes().len(), 2);
}

#[test]
fn consumer_group_consumes_from_subscribed_topic() {
    let entities = vec![
        topic_entity(CLUSTER, "orders"),
        topic_entity(CLUSTER, "payments"),
        consumer_group_entity(CLUSTER, "billing", &["orders", "not-collected"]),
    ];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    let group = entities[2].guid();
    let consumes: Vec<_> = graph
        .get_relationships(group)
        .into_iter()
        .filter(|e| e.relationship_type == RelationshipType::ConsumesFrom)
        .collect();

    assert_eq!(consumes.len(), 1);
    assert_eq!(consumes[0].target, entities[0].guid());
}

#[test]
fn three_node_loop_is_one_cycle() {
    let entities = vec![
        linked_topic(CLUSTER, "a", RelationshipType::ProducesTo, "b"),
        linked_topic(CLUSTER, "b", RelationshipType::ProducesTo, "c"),
        linked_topic(CLUSTER, "c", RelationshipType::ProducesTo, "a"),
    ];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    let cycles = graph.detect_cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 3);
    for entity in &entities {
        assert!(cycles[0].iter().any(|g| g == entity.guid()));
    }
}

#[test]
fn chain_without_back_edge_has_no_cycle() {
    let entities = vec![
        linked_topic(CLUSTER, "a", RelationshipType::ProducesTo, "b"),
        linked_topic(CLUSTER, "b", RelationshipType::ProducesTo, "c"),
        topic_entity(CLUSTER, "c"),
        broker_entity(CLUSTER, "1"),
        cluster_entity(CLUSTER),
    ];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    assert!(graph.detect_cycles().is_empty());
    assert_eq!(graph.get_stats().cycles, 0);
}

#[test]
fn isolated_node_is_the_only_orphan() {
    let entities = vec![
        broker_entity(CLUSTER, "1"),
        cluster_entity(CLUSTER),
        broker_entity("elsewhere", "9"),
    ];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    let orphans = graph.find_orphaned_nodes();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].guid, entities[2].guid());
    assert_eq!(graph.get_stats().orphaned_nodes, 1);
}

#[test]
fn rebuild_replaces_previous_graph() {
    let mut graph = RelationshipGraphBuilder::new();
    let first = vec![
        broker_entity("old", "1"),
        cluster_entity("old"),
        topic_entity("old", "legacy"),
    ];
    graph.build_graph(&first);
    assert_eq!(graph.node_count(), 3);

    let second = vec![broker_entity(CLUSTER, "7"), cluster_entity(CLUSTER)];
    graph.build_graph(&second);

    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    for old in &first {
        assert!(graph.node(old.guid()).is_none());
        assert!(graph.get_relationships(old.guid()).is_empty());
    }
    let export = graph.export_graph();
    assert!(export
        .edges
        .iter()
        .all(|e| e.source.contains(CLUSTER) && e.target.contains(CLUSTER)));
}

#[test]
fn explicit_hosts_and_manages_edges() {
    let mut controller = kafscope_core::CanonicalRecord::broker(CLUSTER, "1");
    controller.metadata.is_controller = true;
    let mut topic = kafscope_core::CanonicalRecord::topic(CLUSTER, "orders");
    topic.metadata.brokers = vec!["1".into(), "2".into()];

    let entities = vec![
        kafscope_devkit::fixtures::entity(controller),
        broker_entity(CLUSTER, "2"),
        kafscope_devkit::fixtures::entity(topic),
        cluster_entity(CLUSTER),
    ];
    let mut graph = RelationshipGraphBuilder::new();
    graph.build_graph(&entities);

    let stats = graph.get_stats();
    assert_eq!(stats.edges_by_type.get(&RelationshipType::Manages), Some(&1));
    assert_eq!(stats.edges_by_type.get(&RelationshipType::Hosts), Some(&2));
    assert_eq!(stats.edges_by_type.get(&RelationshipType::ContainedIn), Some(&3));
}
