//! Agent configuration file
//!
//! TOML, camelCase keys. Looked up in `KAFSCOPE_CONFIG`, then in the OS
//! config dir (`<config>/kafscope/config.toml`). A few values can be
//! overridden from the environment (after `.env` is loaded):
//! - `KAFSCOPE_API_KEY`
//! - `KAFSCOPE_ACCOUNT_ID`
//! - `KAFSCOPE_CLUSTER_NAME`
//! - `KAFSCOPE_LISTEN_ADDR`

use anyhow::{Context, Result};
use kafscope_core::{Inventory, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub listen_addr: String,
    /// Use https for the Jolokia endpoints.
    pub jolokia_tls: bool,
    pub pipeline: PipelineConfig,
    pub inventory: Inventory,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            jolokia_tls: false,
            pipeline: PipelineConfig::default(),
            inventory: Inventory::default(),
        }
    }
}

impl AgentConfig {
    /// Loads, applies env overrides and validates.
    pub async fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut config = Self::load_from(&path).await?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("KAFSCOPE_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("kafscope");
        path.push("config.toml");
        Ok(path)
    }

    /// Missing file -> defaults. Unreadable or invalid file -> error.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AgentConfig =
            toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            brokers = config.inventory.brokers.len(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("KAFSCOPE_API_KEY").filter(|v| !v.is_empty()) {
            self.pipeline.api_key = key;
        }
        if let Some(account) = lookup("KAFSCOPE_ACCOUNT_ID").filter(|v| !v.is_empty()) {
            self.pipeline.account_id = account;
        }
        if let Some(name) = lookup("KAFSCOPE_CLUSTER_NAME").filter(|v| !v.is_empty()) {
            self.pipeline.cluster_name = name;
        }
        if let Some(addr) = lookup("KAFSCOPE_LISTEN_ADDR").filter(|v| !v.is_empty()) {
            self.listen_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.listen_socket()?;
        if self.pipeline.api_key.is_empty() {
            tracing::warn!("no ingest API key configured (KAFSCOPE_API_KEY), egress will be rejected");
        }
        Ok(())
    }

    pub fn listen_socket(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listenAddr '{}'", self.listen_addr))
    }
}
