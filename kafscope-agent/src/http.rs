/*!
API de consultation du graphe de relations

Routes (lecture seule, JSON):
- GET /health
- GET /graph                                   export complet (noeuds + arêtes)
- GET /graph/stats
- GET /graph/orphans
- GET /graph/cycles
- GET /graph/entities/{guid}/relationships
- GET /graph/entities/{guid}/related?type=CONSUMES_FROM

Les GUID contiennent des `|`: les clients doivent les encoder (`%7C`).
*/

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use kafscope_core::{GraphExport, GraphNode, GraphStats, RelationshipEdge, RelationshipType};
use serde::Deserialize;

use crate::state::{GraphSnapshot, Shared};

#[derive(Clone)]
pub struct AppState {
    pub snapshot: Shared<GraphSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    #[serde(rename = "type")]
    relationship_type: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/graph", get(get_graph))
        .route("/graph/stats", get(get_stats))
        .route("/graph/orphans", get(get_orphans))
        .route("/graph/cycles", get(get_cycles))
        .route("/graph/entities/{guid}/relationships", get(get_relationships))
        .route("/graph/entities/{guid}/related", get(get_related))
        .with_state(app_state)
}

// GET /health
async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = app.snapshot.lock();
    Json(serde_json::json!({
        "status": "ok",
        "lastCycleId": snapshot.cycle_id,
        "lastCycleAt": snapshot.completed_at,
        "lastCycleDelivered": snapshot.report.as_ref().map(|r| r.delivered()),
        "nodes": snapshot.graph.node_count(),
    }))
}

// GET /graph
async fn get_graph(State(app): State<AppState>) -> Json<GraphExport> {
    Json(app.snapshot.lock().graph.export_graph())
}

// GET /graph/stats
async fn get_stats(State(app): State<AppState>) -> Json<GraphStats> {
    Json(app.snapshot.lock().graph.get_stats())
}

// GET /graph/orphans
async fn get_orphans(State(app): State<AppState>) -> Json<Vec<GraphNode>> {
    let snapshot = app.snapshot.lock();
    Json(snapshot.graph.find_orphaned_nodes().into_iter().cloned().collect())
}

// GET /graph/cycles
async fn get_cycles(State(app): State<AppState>) -> Json<Vec<Vec<String>>> {
    Json(app.snapshot.lock().graph.detect_cycles())
}

// GET /graph/entities/{guid}/relationships
async fn get_relationships(
    State(app): State<AppState>,
    Path(guid): Path<String>,
) -> Result<Json<Vec<RelationshipEdge>>, StatusCode> {
    let snapshot = app.snapshot.lock();
    if snapshot.graph.node(&guid).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(snapshot.graph.get_relationships(&guid)))
}

// GET /graph/entities/{guid}/related?type=...
async fn get_related(
    State(app): State<AppState>,
    Path(guid): Path<String>,
    Query(params): Query<RelatedParams>,
) -> Result<Json<Vec<GraphNode>>, (StatusCode, String)> {
    let relationship_type = match params.relationship_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(RelationshipType::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("unknown relationship type '{raw}'"),
            )
        })?),
    };

    let snapshot = app.snapshot.lock();
    if snapshot.graph.node(&guid).is_none() {
        return Err((StatusCode::NOT_FOUND, format!("no entity '{guid}'")));
    }
    let related = snapshot
        .graph
        .get_related_entities(&guid, relationship_type)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(related))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_state;
    use kafscope_core::models::RecordMetadata;
    use kafscope_core::{CanonicalRecord, EntitySynthesizer, RelationshipGraphBuilder, SynthesizerConfig};

    fn app() -> AppState {
        let mut synthesizer = EntitySynthesizer::new(SynthesizerConfig {
            account_id: "1".into(),
            provider: "KAFKA".into(),
            environment: "test".into(),
        });
        let records = vec![
            CanonicalRecord::cluster("prod"),
            CanonicalRecord::broker("prod", "1"),
            CanonicalRecord::topic("prod", "orders"),
            CanonicalRecord::consumer_group("prod", "billing").with_metadata(RecordMetadata {
                topics: vec!["orders".into()],
                ..Default::default()
            }),
            CanonicalRecord::broker("elsewhere", "9"),
        ];
        let entities = synthesizer.synthesize_all(&records);
        let mut graph = RelationshipGraphBuilder::new();
        graph.build_graph(&entities);

        AppState {
            snapshot: new_state(GraphSnapshot {
                graph,
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_related_by_type() {
        let Json(related) = get_related(
            State(app()),
            Path("1|KAFKA|prod|billing".to_string()),
            Query(RelatedParams {
                relationship_type: Some("consumes_from".into()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(related.len(), 1);
        assert_eq!(related[0].guid, "1|KAFKA|prod|orders");
    }

    #[tokio::test]
    async fn test_unknown_type_and_entity() {
        let err = get_related(
            State(app()),
            Path("1|KAFKA|prod".to_string()),
            Query(RelatedParams {
                relationship_type: Some("OWNS".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = get_relationships(State(app()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_orphans_and_stats() {
        let state = app();
        let Json(orphans) = get_orphans(State(state.clone())).await;
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].guid, "1|KAFKA|elsewhere|9");

        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.cycles, 0);
    }

    #[tokio::test]
    async fn test_cluster_relationships() {
        let Json(edges) = get_relationships(State(app()), Path("1|KAFKA|prod".to_string()))
            .await
            .unwrap();
        // broker, topic and group are contained in the cluster
        assert_eq!(edges.len(), 3);
        assert!(edges
            .iter()
            .all(|e| e.relationship_type == RelationshipType::ContainedIn));
    }
}
