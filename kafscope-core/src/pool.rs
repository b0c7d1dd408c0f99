//! Bounded pool of collection workers sharing one broker queue.
//!
//! Workers take turns on a shared receiver. Dropping the sender (which
//! [`feed_broker_pool`] does once everything is queued) is the only shutdown
//! signal: each worker finishes its in-flight broker, sees the closed queue
//! and exits.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::collector::{BrokerCollection, MetricCollector};
use crate::error::PipelineError;
use crate::models::BrokerDescriptor;

/// A broker the pool gave up on this cycle.
#[derive(Debug, Clone)]
pub struct BrokerFailure {
    pub broker_id: String,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
struct WorkerReport {
    collections: Vec<BrokerCollection>,
    failures: Vec<BrokerFailure>,
}

/// Outcome of one pool run, after every worker has exited.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub collections: Vec<BrokerCollection>,
    pub failures: Vec<BrokerFailure>,
    /// Workers that panicked. Their in-flight broker is lost.
    pub crashed_workers: usize,
}

/// Completion handle returned by [`CollectionWorkerPool::start`].
pub struct PoolHandle {
    workers: Vec<JoinHandle<WorkerReport>>,
}

impl PoolHandle {
    /// Waits for every worker. A panicking worker is logged and counted,
    /// never propagated.
    pub async fn wait(self) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            match handle.await {
                Ok(report) => {
                    outcome.collections.extend(report.collections);
                    outcome.failures.extend(report.failures);
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "collection worker crashed");
                    outcome.crashed_workers += 1;
                }
            }
        }
        // Ordre stable pour la suite du cycle
        outcome
            .collections
            .sort_by(|a, b| a.broker.id.cmp(&b.broker.id));
        outcome
    }
}

pub struct CollectionWorkerPool;

impl CollectionWorkerPool {
    /// Spawns `pool_size` workers (at least one) pulling from `queue`.
    pub fn start(
        pool_size: usize,
        queue: mpsc::Receiver<BrokerDescriptor>,
        collector: Arc<MetricCollector>,
    ) -> PoolHandle {
        let shared_rx = Arc::new(Mutex::new(queue));
        let num_workers = pool_size.max(1);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let rx = shared_rx.clone();
            let collector = collector.clone();

            workers.push(tokio::spawn(async move {
                tracing::debug!(worker_id, "collection worker started");
                let mut report = WorkerReport::default();

                loop {
                    // Lock only while receiving so other workers can collect.
                    let next = {
                        let mut rx_lock = rx.lock().await;
                        rx_lock.recv().await
                    };
                    let Some(broker) = next else {
                        break;
                    };

                    match collector.collect(&broker).await {
                        Ok(collection) => {
                            tracing::debug!(worker_id, broker_id = %broker.id, "broker collected");
                            report.collections.push(collection);
                        }
                        Err(error) => {
                            tracing::warn!(
                                worker_id,
                                broker_id = %broker.id,
                                error = %error,
                                "skipping broker"
                            );
                            report.failures.push(BrokerFailure {
                                broker_id: broker.id.clone(),
                                error,
                            });
                        }
                    }
                }

                tracing::debug!(
                    worker_id,
                    collected = report.collections.len(),
                    failed = report.failures.len(),
                    "collection worker stopped"
                );
                report
            }));
        }

        PoolHandle { workers }
    }
}

/// Queues every broker, then closes the queue by dropping `sender`.
pub async fn feed_broker_pool(brokers: Vec<BrokerDescriptor>, sender: mpsc::Sender<BrokerDescriptor>) {
    for broker in brokers {
        let broker_id = broker.id.clone();
        if sender.send(broker).await.is_err() {
            tracing::warn!(broker_id = %broker_id, "broker queue closed before feeding finished");
            break;
        }
    }
}
