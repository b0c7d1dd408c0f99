//! kafscope-core: Kafka broker telemetry to monitoring entities.
//!
//! A cycle runs collect -> normalize -> transform -> synthesize -> graph ->
//! stream; see [`pipeline::Pipeline::run_cycle`].

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod jolokia;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod streamer;
pub mod synthesizer;
pub mod transformer;

pub use collector::{MetricCollector, MonitoringConnection, MonitoringProvider};
pub use config::{PipelineConfig, RetryPolicy};
pub use entity::{RelationshipEdge, RelationshipType, SynthesizedEntity};
pub use error::{ErrorKind, PipelineError, Result};
pub use graph::{GraphExport, GraphNode, GraphStats, RelationshipGraphBuilder};
pub use models::{BrokerDescriptor, CanonicalRecord, ConsumerGroupDescriptor, EntityType, Inventory};
pub use pipeline::{CycleReport, Pipeline};
pub use pool::{feed_broker_pool, CollectionWorkerPool, PoolHandle, PoolOutcome};
pub use streamer::{EntityPayload, IngestTransport, Streamer};
pub use synthesizer::{EntitySynthesizer, SynthesizerConfig};
pub use transformer::{AlternateSchema, CompatibilityTransformer, MskSchema, TransformOutcome};
