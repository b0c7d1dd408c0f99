/*!
# kafscope DevKit - Stubs et fixtures pour les tests

Bibliothèque utilisée par les tests d'intégration:
- fournisseur de monitoring simulé (pas de broker ni de Jolokia)
- transport d'ingestion qui enregistre les lots
- fixtures d'entités et harness de pipeline
*/

pub mod fixtures;
pub mod ingest_stub;
pub mod monitoring_stub;

pub use fixtures::PipelineHarness;
pub use ingest_stub::RecordingTransport;
pub use monitoring_stub::MockMonitoringProvider;
