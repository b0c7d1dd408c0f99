//! kafscope agent - periodic Kafka telemetry collection
//!
//! Every `collectionIntervalMs` the agent runs one pipeline cycle over the
//! configured broker inventory, streams the entities to the ingest backend
//! and publishes the resulting relationship graph to the HTTP query API.

mod config;
mod http;
mod state;

use anyhow::{Context, Result};
use kafscope_core::jolokia::JolokiaProvider;
use kafscope_core::streamer::HttpIngestTransport;
use kafscope_core::{Inventory, Pipeline};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::http::AppState;
use crate::state::{new_state, GraphSnapshot, Shared};

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kafscope=info")))
        .init();

    info!("kafscope agent v{} starting", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load().await.context("Failed to load configuration")?;
    let pipeline_config = config.pipeline.clone();

    let mut provider = JolokiaProvider::new(pipeline_config.connection_timeout())
        .context("Failed to create monitoring client")?;
    if config.jolokia_tls {
        provider = provider.with_tls();
    }
    let transport =
        HttpIngestTransport::from_config(&pipeline_config).context("Failed to create ingest client")?;
    let mut pipeline = Pipeline::new(pipeline_config, Arc::new(provider), Arc::new(transport))
        .context("Invalid pipeline configuration")?;

    let snapshot = new_state(GraphSnapshot::default());

    // HTTP
    let addr = config.listen_socket()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let app = http::build_router(AppState {
        snapshot: snapshot.clone(),
    });
    info!("query API listening on http://{addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "query API stopped");
        }
    });

    if config.inventory.brokers.is_empty() {
        warn!("inventory has no brokers, cycles will only report the cluster entity");
    }

    let mut ticker = interval(pipeline.config().collection_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(&mut pipeline, &config.inventory, &snapshot).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

async fn run_cycle(pipeline: &mut Pipeline, inventory: &Inventory, snapshot: &Shared<GraphSnapshot>) {
    let cycle_id = Uuid::new_v4();
    let span = tracing::info_span!("cycle", %cycle_id);

    let report = pipeline.run_cycle(inventory).instrument(span).await;
    if let Some(e) = &report.egress_error {
        error!(%cycle_id, error = %e, "cycle entities not fully delivered");
    }
    if !report.broker_failures.is_empty() {
        warn!(%cycle_id, failures = ?report.broker_failures, "brokers skipped this cycle");
    }

    GraphSnapshot::publish(snapshot, cycle_id, pipeline.graph().clone(), report);
}
