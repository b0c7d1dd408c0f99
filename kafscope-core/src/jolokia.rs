//! Jolokia (JMX over HTTP/JSON) monitoring connection.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::collector::{MonitoringConnection, MonitoringProvider};
use crate::error::{PipelineError, Result};
use crate::models::{AttributeValue, BeanAttributes, BrokerCredentials, BrokerDescriptor};

/// Connects to the Jolokia agent each broker exposes on `monitoring_port`.
#[derive(Clone)]
pub struct JolokiaProvider {
    client: reqwest::Client,
    scheme: &'static str,
}

impl JolokiaProvider {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("kafscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            scheme: "http",
        })
    }

    pub fn with_tls(mut self) -> Self {
        self.scheme = "https";
        self
    }
}

#[async_trait]
impl MonitoringProvider for JolokiaProvider {
    async fn connect(&self, broker: &BrokerDescriptor) -> Result<Box<dyn MonitoringConnection>> {
        let connection = JolokiaConnection {
            client: self.client.clone(),
            base_url: format!("{}://{}/jolokia", self.scheme, broker.monitoring_addr()),
            broker_id: broker.id.clone(),
            credentials: broker.credentials.clone(),
        };

        // Vérifie que l'agent répond avant de lancer les lectures
        let response = connection
            .authorized(connection.client.get(format!("{}/version", connection.base_url)))
            .send()
            .await
            .map_err(|e| PipelineError::connection(&broker.id, e))?;
        if !response.status().is_success() {
            return Err(PipelineError::connection(
                &broker.id,
                format!("jolokia version check returned {}", response.status()),
            ));
        }

        tracing::debug!(broker_id = %broker.id, url = %connection.base_url, "jolokia connection opened");
        Ok(Box::new(connection))
    }
}

pub struct JolokiaConnection {
    client: reqwest::Client,
    base_url: String,
    broker_id: String,
    credentials: Option<BrokerCredentials>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    status: u16,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

impl JolokiaConnection {
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }
}

#[async_trait]
impl MonitoringConnection for JolokiaConnection {
    async fn query(&self, bean: &str) -> Result<BeanAttributes> {
        let response = self
            .authorized(self.client.post(&self.base_url))
            .json(&json!({ "type": "read", "mbean": bean }))
            .send()
            .await
            .map_err(|e| PipelineError::connection(&self.broker_id, e))?;

        if !response.status().is_success() {
            return Err(PipelineError::connection(
                &self.broker_id,
                format!("read {bean} returned {}", response.status()),
            ));
        }

        let body: ReadResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::connection(&self.broker_id, e))?;
        parse_read_response(&self.broker_id, bean, body)
    }

    async fn close(&self) {
        // HTTP: nothing held open beyond the pooled client
        tracing::trace!(broker_id = %self.broker_id, "jolokia connection closed");
    }
}

fn parse_read_response(broker_id: &str, bean: &str, body: ReadResponse) -> Result<BeanAttributes> {
    match body.status {
        200 => Ok(attributes_from_value(&body.value)),
        404 => Ok(BeanAttributes::new()),
        status => Err(PipelineError::connection(
            broker_id,
            format!(
                "read {bean} failed with jolokia status {status}: {}",
                body.error.unwrap_or_default()
            ),
        )),
    }
}

/// Keeps scalar attributes; composite values are skipped.
fn attributes_from_value(value: &Value) -> BeanAttributes {
    let mut attributes = BeanAttributes::new();
    if let Value::Object(map) = value {
        for (name, v) in map {
            match v {
                Value::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        attributes.insert(name.clone(), AttributeValue::Number(f));
                    }
                }
                Value::String(s) => {
                    attributes.insert(name.clone(), AttributeValue::Text(s.clone()));
                }
                _ => {}
            }
        }
    }
    attributes
}
