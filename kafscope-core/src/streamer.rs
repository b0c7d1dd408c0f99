//! Batched egress of synthesized entities to the ingest backend.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{PipelineConfig, RetryPolicy};
use crate::entity::SynthesizedEntity;
use crate::error::{PipelineError, Result};

/// One entity as sent on the wire. Metrics are flattened next to the
/// identity fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPayload {
    pub event_type: String,
    pub entity_type: String,
    pub entity_guid: String,
    pub display_name: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl EntityPayload {
    pub fn from_entity(entity: &SynthesizedEntity, event_type: &str, entity_type_prefix: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            entity_type: format!("{}_{}", entity_type_prefix, entity.entity_type().wire_name()),
            entity_guid: entity.guid().to_string(),
            display_name: entity.display_name().to_string(),
            timestamp: entity.timestamp().timestamp_millis(),
            tags: entity.tags().clone(),
            metrics: entity.metrics().as_map().clone(),
        }
    }
}

/// Delivers one batch. `batch` is the zero-based index within the stream
/// call and is only used for error reporting.
#[async_trait]
pub trait IngestTransport: Send + Sync {
    async fn post_batch(&self, batch: usize, payloads: &[EntityPayload]) -> Result<()>;
}

/// HTTPS POST of a JSON array with the `Api-Key` header.
pub struct HttpIngestTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpIngestTransport {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kafscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.ingest_url(), config.api_key.clone(), config.connection_timeout())
    }
}

#[async_trait]
impl IngestTransport for HttpIngestTransport {
    async fn post_batch(&self, batch: usize, payloads: &[EntityPayload]) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header("Api-Key", &self.api_key)
            .json(payloads)
            .send()
            .await
            .map_err(|e| PipelineError::Egress {
                batch,
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 200 || status == 202 {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::Egress {
            batch,
            status: Some(status),
            message: body.chars().take(512).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub entities_streamed: u64,
    pub batches_sent: u64,
    pub errors: u64,
}

pub struct Streamer {
    transport: Arc<dyn IngestTransport>,
    batch_size: usize,
    event_type: String,
    entity_type_prefix: String,
    retry: RetryPolicy,
    min_batch_interval: Duration,
    stats: StreamStats,
}

impl Streamer {
    pub fn new(transport: Arc<dyn IngestTransport>, batch_size: usize) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            transport,
            batch_size: batch_size.max(1),
            event_type: defaults.event_type,
            entity_type_prefix: defaults.entity_type_prefix,
            retry: RetryPolicy::default(),
            min_batch_interval: Duration::ZERO,
            stats: StreamStats::default(),
        }
    }

    pub fn from_config(transport: Arc<dyn IngestTransport>, config: &PipelineConfig) -> Self {
        Self {
            event_type: config.event_type.clone(),
            entity_type_prefix: config.entity_type_prefix.clone(),
            retry: config.retry.clone(),
            min_batch_interval: config.min_batch_interval(),
            ..Self::new(transport, config.batch_size)
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Sends `entities` in order, `batch_size` at a time, one batch after the
    /// other. Stops at the first batch that cannot be delivered; batches
    /// already sent are not rolled back.
    pub async fn stream(&mut self, entities: &[SynthesizedEntity]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }

        for (batch, chunk) in entities.chunks(self.batch_size).enumerate() {
            if batch > 0 && !self.min_batch_interval.is_zero() {
                tokio::time::sleep(self.min_batch_interval).await;
            }

            let payloads: Vec<EntityPayload> = chunk
                .iter()
                .map(|e| EntityPayload::from_entity(e, &self.event_type, &self.entity_type_prefix))
                .collect();

            if let Err(e) = self.send_with_retry(batch, &payloads).await {
                self.stats.errors += 1;
                tracing::error!(batch, entities = payloads.len(), error = %e, "batch not delivered");
                return Err(e);
            }

            self.stats.batches_sent += 1;
            self.stats.entities_streamed += payloads.len() as u64;
            tracing::debug!(batch, entities = payloads.len(), "batch delivered");
        }

        Ok(())
    }

    async fn send_with_retry(&self, batch: usize, payloads: &[EntityPayload]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.transport.post_batch(batch, payloads).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(batch, attempt, ?delay, error = %e, "retrying batch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
