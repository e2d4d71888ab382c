//! Local node supervisor
//!
//! `LocalNode` owns the node's identity records and its service registry and
//! drives every service through init, run and stop:
//!
//! ```text
//! Constructed ──start──▶ Starting ──▶ Running ──stop──▶ Stopping ──drained──▶ Stopped
//! ```
//!
//! Startup is two-phase. Every registered service is initialized first; the
//! ones that fail are logged and left out. Each service that initialized then
//! gets its own task running its main loop. Those tasks are never joined one
//! by one: each signals a shared completion counter when it ends, and
//! `wait_stop` waits for that counter to drain.

use crate::config::{Config, NodeConfig};
use crate::identity;
use crate::service::Service;
use crate::state::State;
use crate::{Error, Result};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Constructed,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Constructed => write!(f, "constructed"),
            NodeStatus::Starting => write!(f, "starting"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Stopping => write!(f, "stopping"),
            NodeStatus::Stopped => write!(f, "stopped"),
        }
    }
}

struct Records {
    config: Config,
    state: State,
}

/// Completion count of the run phase; `None` until services are launched
type Pending = watch::Sender<Option<usize>>;

/// The node supervisor
pub struct LocalNode {
    records: RwLock<Records>,
    services: HashMap<String, Arc<dyn Service>>,
    status: Arc<Mutex<NodeStatus>>,
    run_set: Mutex<Vec<String>>,
    pending: Arc<Pending>,
    stop_requested: AtomicBool,
}

impl LocalNode {
    /// Derive the node identity and build the service registry.
    ///
    /// A service registered under a name that is already taken replaces the
    /// earlier one.
    pub fn new<I>(config: NodeConfig, services: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Service>>,
    {
        let identity = identity::derive(&config.secret_key)?;

        let mut registry: HashMap<String, Arc<dyn Service>> = HashMap::new();
        for service in services {
            let name = service.name().to_string();
            if registry.insert(name.clone(), service).is_some() {
                warn!("Service {} registered twice, keeping the later instance", name);
            }
        }

        info!(
            network_id = %identity.network_id,
            address_block = %identity.address_block,
            services = registry.len(),
            "Local node constructed"
        );

        let (pending, _) = watch::channel(None);

        Ok(Self {
            records: RwLock::new(Records {
                config: Config::new(config.secret_key, identity.network_id),
                state: State::from(identity),
            }),
            services: registry,
            status: Arc::new(Mutex::new(NodeStatus::Constructed)),
            run_set: Mutex::new(Vec::new()),
            pending: Arc::new(pending),
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Start building a node from its inbound configuration
    pub fn builder(config: NodeConfig) -> LocalNodeBuilder {
        LocalNodeBuilder {
            config,
            services: Vec::new(),
        }
    }

    /// Snapshot of the node configuration
    pub fn config(&self) -> Config {
        self.records.read().config.clone()
    }

    /// Snapshot of the node state
    pub fn state(&self) -> State {
        self.records.read().state.clone()
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.lock()
    }

    /// Initialize every registered service, then launch the ones that
    /// succeeded. Returns without waiting for them.
    pub async fn start(&self) -> Result<()> {
        {
            let mut status = self.status.lock();
            if *status != NodeStatus::Constructed {
                return Err(Error::InvalidStateTransition {
                    from: status.to_string(),
                    to: NodeStatus::Starting.to_string(),
                });
            }
            *status = NodeStatus::Starting;
        }

        let mut initialized = Vec::with_capacity(self.services.len());
        for (name, service) in &self.services {
            debug!("[{}] service init", name);
            match service.init(self).await {
                Ok(()) => initialized.push((name.clone(), Arc::clone(service))),
                Err(source) => {
                    let err = Error::ServiceInit {
                        service: name.clone(),
                        source,
                    };
                    error!("{}", err);
                }
            }
        }

        let mut status = self.status.lock();
        if *status != NodeStatus::Starting {
            warn!(
                "Stop requested during startup, not launching {} initialized services",
                initialized.len()
            );
            self.pending.send_replace(Some(0));
            settle(&mut status);
            return Ok(());
        }

        *self.run_set.lock() = initialized.iter().map(|(name, _)| name.clone()).collect();
        self.pending.send_replace(Some(initialized.len()));
        *status = NodeStatus::Running;
        if initialized.is_empty() {
            warn!("No service initialized successfully");
            settle(&mut status);
        }
        drop(status);

        info!(
            "Local node running {} of {} services",
            initialized.len(),
            self.services.len()
        );

        for (name, service) in initialized {
            let guard = CompletionGuard {
                pending: Arc::clone(&self.pending),
                status: Arc::clone(&self.status),
            };
            tokio::spawn(async move {
                let _guard = guard;
                debug!("[{}] service run", name);
                match service.run().await {
                    Ok(()) => info!("Service {} finished", name),
                    Err(source) => {
                        let err = Error::ServiceRun {
                            service: name,
                            source,
                        };
                        error!("{}", err);
                    }
                }
            });
        }

        Ok(())
    }

    /// Look up a registered service.
    ///
    /// # Panics
    ///
    /// Panics if no service is registered under `name`. Use
    /// [`LocalNode::try_get_service`] for names that come from outside.
    pub fn get_service(&self, name: &str) -> Arc<dyn Service> {
        self.try_get_service(name).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Look up a registered service, failing with `ServiceNotFound`
    pub fn try_get_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// Names of all registered services, sorted
    pub fn registered_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the services launched by `start`, sorted
    pub fn running_services(&self) -> Vec<String> {
        let mut names = self.run_set.lock().clone();
        names.sort();
        names
    }

    /// Number of launched services that have not finished yet
    pub fn pending_services(&self) -> usize {
        self.pending.borrow().unwrap_or(0)
    }

    /// Wait until every service launched by `start` has finished.
    ///
    /// Returns immediately on a node that was never started.
    pub async fn wait_stop(&self) {
        if self.status() == NodeStatus::Constructed {
            return;
        }
        let mut rx = self.pending.subscribe();
        // The sender is owned by `self`, so the channel outlives this wait.
        let _ = rx.wait_for(|pending| *pending == Some(0)).await;
        settle(&mut self.status.lock());
    }

    /// [`LocalNode::wait_stop`] bounded by a deadline
    pub async fn wait_stop_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait_stop())
            .await
            .map_err(|_| Error::Timeout(timeout))
    }

    /// Ask every registered service to stop, including those whose init
    /// failed. Does not wait for run loops to return; see
    /// [`LocalNode::wait_stop`]. Only the first call has any effect.
    pub async fn stop(&self) -> Result<()> {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!("Stop already requested");
            return Ok(());
        }

        info!("Closing up local node");
        {
            let mut status = self.status.lock();
            match *status {
                NodeStatus::Constructed => {
                    *status = NodeStatus::Stopped;
                    self.pending.send_replace(Some(0));
                }
                NodeStatus::Starting | NodeStatus::Running => *status = NodeStatus::Stopping,
                NodeStatus::Stopping | NodeStatus::Stopped => {}
            }
        }

        let stops = self.services.iter().map(|(name, service)| async move {
            debug!("[{}] service stop", name);
            if let Err(source) = service.stop().await {
                let err = Error::ServiceStop {
                    service: name.clone(),
                    source,
                };
                warn!("{}", err);
            }
        });
        join_all(stops).await;

        if *self.pending.borrow() == Some(0) {
            settle(&mut self.status.lock());
        }

        Ok(())
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("status", &self.status())
            .field("services", &self.registered_services())
            .field("pending", &self.pending_services())
            .finish()
    }
}

/// Builder collecting the services a node is constructed with
pub struct LocalNodeBuilder {
    config: NodeConfig,
    services: Vec<Arc<dyn Service>>,
}

impl LocalNodeBuilder {
    /// Register a service
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    pub fn build(self) -> Result<LocalNode> {
        LocalNode::new(self.config, self.services)
    }
}

/// Signals one completion when a service task ends, even by panic
struct CompletionGuard {
    pending: Arc<Pending>,
    status: Arc<Mutex<NodeStatus>>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let mut drained = false;
        self.pending.send_modify(|pending| {
            if let Some(count) = pending {
                *count = count.saturating_sub(1);
                drained = *count == 0;
            }
        });
        if drained {
            settle(&mut self.status.lock());
        }
    }
}

/// Move a node whose run phase has drained to `Stopped`
fn settle(status: &mut NodeStatus) {
    if matches!(*status, NodeStatus::Running | NodeStatus::Stopping) {
        *status = NodeStatus::Stopped;
        info!("Local node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AddressBlock, SecretKey};

    fn test_node() -> LocalNode {
        LocalNode::new(NodeConfig::new(SecretKey::generate().to_hex()), Vec::new()).unwrap()
    }

    #[test]
    fn test_status_display() {
        assert_eq!(NodeStatus::Constructed.to_string(), "constructed");
        assert_eq!(NodeStatus::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_snapshots_are_independent() {
        let node = test_node();
        let mut state = node.state();
        let other = AddressBlock::try_from("fd00::/48".to_string()).unwrap();
        state.address_block = other;
        assert_ne!(node.state().address_block, other);
        assert_eq!(node.config().network_id(), node.state().network_id);
    }

    #[test]
    fn test_settle_only_from_active_states() {
        let mut status = NodeStatus::Constructed;
        settle(&mut status);
        assert_eq!(status, NodeStatus::Constructed);

        let mut status = NodeStatus::Stopping;
        settle(&mut status);
        assert_eq!(status, NodeStatus::Stopped);
    }

    #[tokio::test]
    async fn test_empty_node_lifecycle() {
        let node = test_node();
        node.start().await.unwrap();
        assert_eq!(node.status(), NodeStatus::Stopped);
        assert_eq!(node.pending_services(), 0);

        node.wait_stop().await;
        assert_eq!(node.status(), NodeStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let node = test_node();
        node.stop().await.unwrap();
        assert_eq!(node.status(), NodeStatus::Stopped);
        node.wait_stop().await;
        assert!(matches!(
            node.start().await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }
}
