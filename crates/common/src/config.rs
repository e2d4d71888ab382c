//! Node configuration records

use crate::identity::NetworkId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inbound configuration a node is constructed from
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hex-encoded secret key; every node sharing it joins the same network
    #[serde(default)]
    pub secret_key: String,
}

impl NodeConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("secret_key", &redact(&self.secret_key))
            .finish()
    }
}

/// Process-wide configuration, fixed once the node is constructed
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    secret_key: String,
    network_id: NetworkId,
}

impl Config {
    pub(crate) fn new(secret_key: String, network_id: NetworkId) -> Self {
        Self {
            secret_key,
            network_id,
        }
    }

    /// Raw secret key as supplied by the operator
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("secret_key", &redact(&self.secret_key))
            .field("network_id", &self.network_id)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}
