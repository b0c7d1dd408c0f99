use chrono::{DateTime, Utc};
use kafscope_core::{CycleReport, RelationshipGraphBuilder};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Last completed cycle, as served by the HTTP API. Replaced wholesale after
/// every cycle, never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub graph: RelationshipGraphBuilder,
    pub cycle_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub report: Option<CycleReport>,
}

impl GraphSnapshot {
    pub fn publish(state: &Shared<GraphSnapshot>, cycle_id: Uuid, graph: RelationshipGraphBuilder, report: CycleReport) {
        let snapshot = GraphSnapshot {
            graph,
            cycle_id: Some(cycle_id),
            completed_at: Some(Utc::now()),
            report: Some(report),
        };
        *state.lock() = snapshot;
    }
}
