/*!
Transport d'ingestion qui enregistre au lieu d'envoyer

Garde chaque lot reçu pour les assertions et peut simuler un refus du
backend sur un appel donné.
*/

use async_trait::async_trait;
use kafscope_core::streamer::{EntityPayload, IngestTransport};
use kafscope_core::{PipelineError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<Vec<EntityPayload>>>,
    /// (numéro d'appel, statut HTTP)
    failure: Mutex<Option<(usize, u16)>>,
    calls: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// L'appel numéro `call` (à partir de 0) répond `status`
    pub fn fail_on_call(self, call: usize, status: u16) -> Self {
        *self.failure.lock() = Some((call, status));
        self
    }

    pub fn batches(&self) -> Vec<Vec<EntityPayload>> {
        self.batches.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    pub fn total_entities(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// GUIDs dans l'ordre d'envoi
    pub fn guids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|p| p.entity_guid.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.batches.lock().clear();
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl IngestTransport for RecordingTransport {
    async fn post_batch(&self, batch: usize, payloads: &[EntityPayload]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((failing_call, status)) = *self.failure.lock() {
            if failing_call == call {
                tracing::debug!(batch, status, "[MOCK] batch rejected");
                return Err(PipelineError::Egress {
                    batch,
                    status: Some(status),
                    message: "rejected by mock backend".into(),
                });
            }
        }
        self.batches.lock().push(payloads.to_vec());
        Ok(())
    }
}
