/*!
Fournisseur de monitoring simulé

Permet de tester la collecte sans broker Kafka ni agent Jolokia.
Les beans sont servis depuis la mémoire; certains brokers peuvent être
déclarés en panne et chaque ouverture/fermeture de connexion est comptée.
*/

use async_trait::async_trait;
use kafscope_core::collector::{MonitoringConnection, MonitoringProvider};
use kafscope_core::models::{AttributeValue, BeanAttributes, BrokerDescriptor};
use kafscope_core::{PipelineError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type BeanTable = BTreeMap<String, BeanAttributes>;

#[derive(Default)]
struct MockState {
    shared_beans: BeanTable,
    broker_beans: HashMap<String, BeanTable>,
    failing: HashSet<String>,
    query_delay: Option<Duration>,
}

/// Mock qui remplace `JolokiaProvider`
#[derive(Clone, Default)]
pub struct MockMonitoringProvider {
    state: Arc<Mutex<MockState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockMonitoringProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribut `Value` servi par tous les brokers
    pub fn with_gauge(self, bean: &str, value: f64) -> Self {
        self.insert(None, bean, "Value", value);
        self
    }

    /// Attribut `OneMinuteRate` servi par tous les brokers
    pub fn with_rate(self, bean: &str, value: f64) -> Self {
        self.insert(None, bean, "OneMinuteRate", value);
        self
    }

    /// Attribut `Value` servi par un seul broker (prioritaire sur le partagé)
    pub fn with_broker_gauge(self, broker_id: &str, bean: &str, value: f64) -> Self {
        self.insert(Some(broker_id), bean, "Value", value);
        self
    }

    pub fn with_broker_rate(self, broker_id: &str, bean: &str, value: f64) -> Self {
        self.insert(Some(broker_id), bean, "OneMinuteRate", value);
        self
    }

    /// Toute connexion vers ce broker échoue
    pub fn fail_broker(self, broker_id: &str) -> Self {
        self.state.lock().failing.insert(broker_id.to_string());
        self
    }

    /// Chaque lecture attend `delay` avant de répondre
    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.state.lock().query_delay = Some(delay);
        self
    }

    fn insert(&self, broker_id: Option<&str>, bean: &str, attribute: &str, value: f64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let table = match broker_id {
            Some(id) => state.broker_beans.entry(id.to_string()).or_default(),
            None => &mut state.shared_beans,
        };
        table
            .entry(bean.to_string())
            .or_default()
            .insert(attribute.to_string(), AttributeValue::Number(value));
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connexions ouvertes et pas encore refermées
    pub fn open_connections(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

#[async_trait]
impl MonitoringProvider for MockMonitoringProvider {
    async fn connect(&self, broker: &BrokerDescriptor) -> Result<Box<dyn MonitoringConnection>> {
        let state = self.state.lock();
        if state.failing.contains(&broker.id) {
            tracing::debug!(broker_id = %broker.id, "[MOCK] connection refused");
            return Err(PipelineError::connection(&broker.id, "connection refused (mock)"));
        }

        let mut beans = state.shared_beans.clone();
        if let Some(own) = state.broker_beans.get(&broker.id) {
            for (bean, attributes) in own {
                beans.entry(bean.clone()).or_default().extend(attributes.clone());
            }
        }
        let delay = state.query_delay;
        drop(state);

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            beans,
            delay,
            closed: self.closed.clone(),
        }))
    }
}

struct MockConnection {
    beans: BeanTable,
    delay: Option<Duration>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl MonitoringConnection for MockConnection {
    async fn query(&self, bean: &str) -> Result<BeanAttributes> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.beans.get(bean).cloned().unwrap_or_default())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEADERS: &str = "kafka.server:type=ReplicaManager,name=LeaderCount";

    #[tokio::test]
    async fn test_broker_override_wins() {
        let provider = MockMonitoringProvider::new()
            .with_gauge(LEADERS, 1.0)
            .with_broker_gauge("2", LEADERS, 5.0);

        let one = provider.connect(&BrokerDescriptor::new("1", "h1", 1)).await.unwrap();
        let two = provider.connect(&BrokerDescriptor::new("2", "h2", 1)).await.unwrap();

        assert_eq!(one.query(LEADERS).await.unwrap()["Value"].as_f64(), Some(1.0));
        assert_eq!(two.query(LEADERS).await.unwrap()["Value"].as_f64(), Some(5.0));
        assert!(one.query("unknown").await.unwrap().is_empty());
        assert_eq!(provider.open_connections(), 2);
    }

    #[tokio::test]
    async fn test_failing_broker() {
        let provider = MockMonitoringProvider::new().fail_broker("3");
        assert!(provider
            .connect(&BrokerDescriptor::new("3", "h3", 1))
            .await
            .is_err());
        assert_eq!(provider.opened(), 0);
    }
}
