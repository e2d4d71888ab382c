//! meshnode common library
//!
//! Runtime core of an overlay mesh node: key-derived identity, the node's
//! configuration and state records, and the supervisor that drives pluggable
//! services (discovery, routing table, NAT traversal) through their lifecycle.

pub mod config;
pub mod error;
pub mod identity;
pub mod node;
pub mod service;
pub mod state;

// Re-export commonly used types
pub use config::{Config, NodeConfig};
pub use error::{Error, Result};
pub use identity::{derive, AddressBlock, Identity, NetworkId, PublicKey, SecretKey};
pub use node::{LocalNode, LocalNodeBuilder, NodeStatus};
pub use service::{Service, ShutdownSignal};
pub use state::State;

/// meshnode version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
