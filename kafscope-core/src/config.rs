//! Options recognized by the pipeline. Keys are camelCase so the same struct
//! reads straight from the agent's TOML file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub cluster_name: String,
    pub account_id: String,
    pub provider: String,
    pub environment: String,

    /// Collection worker count.
    pub pool_size: usize,
    pub connection_timeout_ms: u64,
    pub collection_interval_ms: u64,
    pub collect_topics: bool,
    pub topics: Vec<String>,

    pub alternate_schema_enabled: bool,
    pub alternate_provider: String,

    pub ingest_endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub event_type: String,
    pub entity_type_prefix: String,
    /// Entities per egress batch.
    pub batch_size: usize,
    pub min_batch_interval_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default-kafka-cluster".to_string(),
            account_id: String::new(),
            provider: "KAFKA".to_string(),
            environment: "production".to_string(),
            pool_size: 5,
            connection_timeout_ms: 10_000,
            collection_interval_ms: 30_000,
            collect_topics: false,
            topics: Vec::new(),
            alternate_schema_enabled: false,
            alternate_provider: "AWS_MSK".to_string(),
            ingest_endpoint: "https://insights-collector.newrelic.com".to_string(),
            api_key: String::new(),
            event_type: "MessageQueueSample".to_string(),
            entity_type_prefix: "KAFKA".to_string(),
            batch_size: 100,
            min_batch_interval_ms: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_millis(self.collection_interval_ms)
    }

    pub fn min_batch_interval(&self) -> Duration {
        Duration::from_millis(self.min_batch_interval_ms)
    }

    /// Full ingest URL: `{endpoint}/v1/accounts/{accountId}/events`.
    pub fn ingest_url(&self) -> String {
        format!(
            "{}/v1/accounts/{}/events",
            self.ingest_endpoint.trim_end_matches('/'),
            self.account_id
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(PipelineError::Config("clusterName must not be empty".into()));
        }
        if self.account_id.trim().is_empty() {
            return Err(PipelineError::Config("accountId must not be empty".into()));
        }
        if self.cluster_name.contains('|') || self.account_id.contains('|') || self.provider.contains('|') {
            return Err(PipelineError::Config(
                "clusterName, accountId and provider must not contain '|'".into(),
            ));
        }
        if self.pool_size == 0 {
            return Err(PipelineError::Config("poolSize must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batchSize must be at least 1".into()));
        }
        if self.connection_timeout_ms == 0 {
            return Err(PipelineError::Config("connectionTimeoutMs must be positive".into()));
        }
        if !self.ingest_endpoint.starts_with("https://") {
            return Err(PipelineError::Config(format!(
                "ingestEndpoint must be an https URL, got '{}'",
                self.ingest_endpoint
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.maxAttempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Per-batch retry policy for egress. One attempt by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_an_account() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let config = PipelineConfig {
            account_id: "12345".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PipelineConfig {
            account_id: "12345".into(),
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            account_id: "12345".into(),
            cluster_name: "a|b".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            account_id: "12345".into(),
            ingest_endpoint: "ftp://example".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // plain http is refused, the api key travels in a header
        let config = PipelineConfig {
            account_id: "12345".into(),
            ingest_endpoint: "http://ingest.example.com".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            account_id: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ingest_url() {
        let config = PipelineConfig {
            ingest_endpoint: "https://ingest.example.com/".into(),
            account_id: "12345".into(),
            ..Default::default()
        };
        assert_eq!(
            config.ingest_url(),
            "https://ingest.example.com/v1/accounts/12345/events"
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn test_camel_case_keys() {
        let json = r#"{"clusterName":"prod","batchSize":50,"alternateSchemaEnabled":true,"retry":{"maxAttempts":3}}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.batch_size, 50);
        assert!(config.alternate_schema_enabled);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.pool_size, 5);
    }
}
