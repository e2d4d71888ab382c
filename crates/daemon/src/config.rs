//! Daemon configuration

use meshnode_common::NodeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Node identity
    pub node: NodeConfig,

    /// Net table configuration
    pub nettable: NetTableConfig,

    /// Built-in services to register
    pub services: ServicesConfig,

    /// How long to wait for services to finish after a stop request
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            nettable: NetTableConfig::default(),
            services: ServicesConfig::default(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Net table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetTableConfig {
    /// Interval between stale-peer sweeps
    pub sweep_interval_secs: u64,

    /// Peers not seen for this long are dropped
    pub peer_ttl_secs: u64,
}

impl Default for NetTableConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            peer_ttl_secs: 300,
        }
    }
}

impl NetTableConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }
}

/// Built-in service toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub nettable: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self { nettable: true }
    }
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
