//! Pluggable node services
//!
//! Discovery, the routing table and NAT traversal all plug into the node the
//! same way: implement [`Service`] and register the instance with the
//! [`LocalNode`] before it starts.

use crate::node::LocalNode;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle contract implemented by every node service
#[async_trait]
pub trait Service: Send + Sync {
    /// Registry key; must be unique among the node's services
    fn name(&self) -> &str;

    /// One-time setup. A failure keeps the service out of the run phase
    /// without affecting its siblings.
    async fn init(&self, node: &LocalNode) -> anyhow::Result<()>;

    /// Main loop. Returns once, after `stop` or on an unrecoverable error.
    async fn run(&self) -> anyhow::Result<()>;

    /// Ask `run` to return. Called concurrently with `run`, and also on
    /// services whose `init` never succeeded, where it must do nothing.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// One-shot stop latch shared between a service's `run` and `stop`.
///
/// A trigger that happens before anyone waits is not lost.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trip the latch. Returns `false` if it was already tripped.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch is tripped
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
