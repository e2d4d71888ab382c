//! Net table service
//!
//! Keeps the set of overlay peers this node currently knows about. The table
//! works on a private copy of the node state taken at init; the node's own
//! record is never touched. Whatever protocol learns about peers feeds them in
//! through [`NetTable::upsert_peer`], and the run loop periodically drops
//! entries that have not been refreshed within the TTL.
//!
//! All members of a network share one key, and with it one public key and one
//! address block, so a peer is identified by its overlay address.

use crate::config::NetTableConfig;
use anyhow::{bail, Context};
use async_trait::async_trait;
use meshnode_common::{LocalNode, Service, ShutdownSignal, State};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Registry name of the net table
pub const NAME: &str = "nettable";

/// A known overlay peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: IpAddr,
    pub last_seen: Instant,
}

/// Peer table scoped to the node's network
pub struct NetTable {
    config: NetTableConfig,
    state: RwLock<Option<State>>,
    peers: RwLock<HashMap<IpAddr, Peer>>,
    shutdown: ShutdownSignal,
}

impl NetTable {
    pub fn new(config: NetTableConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
            peers: RwLock::new(HashMap::new()),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// The table's private copy of the node state, once initialized
    pub fn state(&self) -> Option<State> {
        self.state.read().clone()
    }

    /// Record a peer sighting. Returns `true` if the peer was not known yet.
    pub fn upsert_peer(&self, address: IpAddr, seen_at: Instant) -> anyhow::Result<bool> {
        let state = self.state().context("net table is not initialized")?;
        if !state.address_block.contains(address) {
            bail!(
                "peer address {} is outside the network block {}",
                address,
                state.address_block
            );
        }

        let peer = Peer {
            address,
            last_seen: seen_at,
        };
        let is_new = self.peers.write().insert(address, peer).is_none();
        if is_new {
            debug!("Added peer {}", address);
        }
        Ok(is_new)
    }

    /// Snapshot of known peers, ordered by address
    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.read().values().cloned().collect();
        peers.sort_by_key(|p| p.address);
        peers
    }

    /// Drop peers not seen within the TTL. Returns how many were removed.
    pub fn expire_stale(&self, now: Instant) -> usize {
        let ttl = self.config.peer_ttl();
        let mut peers = self.peers.write();
        let before = peers.len();
        peers.retain(|_, peer| now.saturating_duration_since(peer.last_seen) <= ttl);
        before - peers.len()
    }
}

#[async_trait]
impl Service for NetTable {
    fn name(&self) -> &str {
        NAME
    }

    async fn init(&self, node: &LocalNode) -> anyhow::Result<()> {
        if self.config.sweep_interval().is_zero() {
            bail!("sweep interval must be greater than zero");
        }
        let state = node.state();
        info!(
            "Net table scoped to network {} ({})",
            state.network_id, state.address_block
        );
        *self.state.write() = Some(state);
        Ok(())
    }

    async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = ticker.tick() => {
                    let removed = self.expire_stale(Instant::now());
                    if removed > 0 {
                        info!("Expired {} stale peers", removed);
                    }
                }
            }
        }

        info!("Net table stopped with {} peers", self.peers.read().len());
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.shutdown.trigger();
        Ok(())
    }
}
