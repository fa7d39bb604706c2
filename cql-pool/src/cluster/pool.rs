use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::future::RemoteHandle;
use futures::FutureExt;
use itertools::Itertools;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use super::HostInfo;
use crate::network::{
    Connection, Connector, HostConnectionPool, HostUnreachable, HostUnreachableSender, PoolConfig,
};
use crate::policies::conn_selection::ConnSelectionPolicyFactory;
use crate::policies::host_selection::{HostSelectionPolicy, SelectedHost};
use crate::routing::RoutingInfo;

/// Connection pool for a whole cluster.
///
/// Keeps one [HostConnectionPool] per live host and routes every request with the
/// configured [HostSelectionPolicy]: the policy yields candidate hosts, and the
/// first host whose pool has a connection serves the request.
///
/// The topology is driven from outside with [set_hosts](Self::set_hosts),
/// [add_host](Self::add_host) and [remove_host](Self::remove_host) (or their
/// [host_up](Self::host_up) and [host_down](Self::host_down) aliases). Topology
/// changes are serialized; [pick](Self::pick) never waits for them.
///
/// Dropping the pool closes every host pool, as [close](Self::close) does.
pub struct PolicyConnectionPool {
    inner: Arc<PolicyPoolInner>,
    _worker_handle: RemoteHandle<()>,
}

struct PolicyPoolInner {
    pool_config: PoolConfig,
    known_nodes: Vec<String>,
    connector: Arc<dyn Connector>,
    host_policy: Arc<dyn HostSelectionPolicy>,
    conn_policy_factory: ConnSelectionPolicyFactory,

    // Pools of the tracked hosts, keyed by peer address.
    host_pools: RwLock<HashMap<String, HostConnectionPool>>,
    // Set under the `host_pools` write lock. Pools created after it is set are closed.
    closed: AtomicBool,
    // Serializes topology changes. Held across pool creation, which dials.
    // `close` does not take it.
    topology_lock: Mutex<()>,
    unreachable_sender: HostUnreachableSender,
}

impl PolicyConnectionPool {
    /// Creates a pool that tracks no hosts yet.
    ///
    /// Must be called within a Tokio runtime: the pool spawns a worker that
    /// marks unreachable hosts down.
    pub fn new(
        pool_config: PoolConfig,
        connector: Arc<dyn Connector>,
        host_policy: Arc<dyn HostSelectionPolicy>,
        conn_policy_factory: ConnSelectionPolicyFactory,
    ) -> Self {
        Self::with_known_nodes(
            pool_config,
            Vec::new(),
            connector,
            host_policy,
            conn_policy_factory,
        )
    }

    pub(crate) fn with_known_nodes(
        pool_config: PoolConfig,
        known_nodes: Vec<String>,
        connector: Arc<dyn Connector>,
        host_policy: Arc<dyn HostSelectionPolicy>,
        conn_policy_factory: ConnSelectionPolicyFactory,
    ) -> Self {
        let (unreachable_sender, unreachable_receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(PolicyPoolInner {
            pool_config,
            known_nodes,
            connector,
            host_policy,
            conn_policy_factory,
            host_pools: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            topology_lock: Mutex::new(()),
            unreachable_sender,
        });

        let (fut, worker_handle) =
            unreachable_hosts_worker(Arc::downgrade(&inner), unreachable_receiver).remote_handle();
        tokio::spawn(fut);

        Self {
            inner,
            _worker_handle: worker_handle,
        }
    }

    /// Replaces the set of tracked hosts.
    ///
    /// Pools of hosts that are gone (or no longer up) are closed. New up hosts get a
    /// pool each, dialed concurrently; a new host is tracked only if at least one
    /// connection to it could be opened. The host selection policy receives the full
    /// list, including hosts that could not be reached.
    pub async fn set_hosts(&self, hosts: &[Arc<HostInfo>]) {
        self.inner.set_hosts(hosts).await
    }

    /// Starts tracking a single host, or refills its pool if it is tracked already.
    pub async fn add_host(&self, host: Arc<HostInfo>) {
        self.inner.add_host(host).await
    }

    /// Stops tracking the host with the given peer address and closes its pool.
    pub async fn remove_host(&self, peer: &str) {
        self.inner.remove_host(peer).await
    }

    /// The host became available. Same as [add_host](Self::add_host).
    pub async fn host_up(&self, host: Arc<HostInfo>) {
        self.inner.add_host(host).await
    }

    /// The host became unavailable. Same as [remove_host](Self::remove_host).
    pub async fn host_down(&self, peer: &str) {
        self.inner.remove_host(peer).await
    }

    /// Informs the host selection policy about the partitioner of the cluster.
    pub fn set_partitioner(&self, partitioner: &str) {
        self.inner.host_policy.set_partitioner(partitioner);
    }

    /// Selects a host and one of its connections for a request.
    ///
    /// Walks the plan of the host selection policy and stops at the first host
    /// whose pool yields a connection. Returns `None` when no host in the plan
    /// has one.
    ///
    /// # Panics
    ///
    /// Panics if the host selection policy yields a candidate without host info.
    pub fn pick(&self, info: &RoutingInfo<'_>) -> Option<(Box<dyn SelectedHost>, Arc<dyn Connection>)> {
        let host_policy = &self.inner.host_policy;
        for selected in host_policy.pick(info) {
            let Some(host) = selected.info() else {
                panic!(
                    "policy {} returned a candidate without host info: {:?}",
                    host_policy.name(),
                    selected
                );
            };

            let pool = self.inner.host_pools.read().unwrap().get(host.peer()).cloned();
            let Some(pool) = pool else {
                trace!("[{}] Host has no pool, trying the next one", host.peer());
                continue;
            };

            if let Some(conn) = pool.pick(info) {
                return Some((selected, conn));
            }
        }
        None
    }

    /// Total number of open connections over all tracked hosts.
    pub fn size(&self) -> usize {
        self.inner
            .host_pools
            .read()
            .unwrap()
            .values()
            .map(HostConnectionPool::size)
            .sum()
    }

    /// Closes every host pool and forgets all hosts.
    ///
    /// Does not wait for topology changes in progress: pools they are still
    /// dialing are closed as soon as they connect, and later topology changes
    /// do nothing.
    pub async fn close(&self) {
        self.inner.close();
    }

    /// Contact points this pool was built with.
    pub fn known_nodes(&self) -> &[String] {
        &self.inner.known_nodes
    }

    /// Pool of the host with the given peer address, if tracked.
    pub fn host_pool(&self, peer: &str) -> Option<HostConnectionPool> {
        self.inner.host_pools.read().unwrap().get(peer).cloned()
    }

    /// Peer addresses of the tracked hosts, sorted.
    pub fn tracked_hosts(&self) -> Vec<String> {
        self.inner
            .host_pools
            .read()
            .unwrap()
            .keys()
            .cloned()
            .sorted()
            .collect()
    }

    /// The policy used to route requests between hosts.
    pub fn host_selection_policy(&self) -> &Arc<dyn HostSelectionPolicy> {
        &self.inner.host_policy
    }
}

impl Drop for PolicyConnectionPool {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for PolicyConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pools = self.inner.host_pools.read().unwrap();
        f.debug_struct("PolicyConnectionPool")
            .field("host_policy", &self.inner.host_policy.name())
            .field("pool_config", &self.inner.pool_config)
            .field("host_pools", &*pools)
            .finish_non_exhaustive()
    }
}

impl PolicyPoolInner {
    fn new_host_pool(&self, host: Arc<HostInfo>) -> HostConnectionPool {
        HostConnectionPool::with_unreachable_sender(
            host,
            &self.pool_config,
            Arc::clone(&self.connector),
            (self.conn_policy_factory)(),
            Some(self.unreachable_sender.clone()),
        )
    }

    async fn create_host_pool(&self, host: Arc<HostInfo>) -> HostConnectionPool {
        let pool = self.new_host_pool(host);
        pool.fill().await;
        pool
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        let pools: Vec<HostConnectionPool> = {
            let mut pools = self
                .host_pools
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.host_policy.set_hosts(&[]);
            pools.drain().map(|(_, pool)| pool).collect()
        };

        debug!("Closing {} host pools", pools.len());
        for pool in pools {
            pool.close();
        }
    }

    async fn set_hosts(&self, hosts: &[Arc<HostInfo>]) {
        let _topology = self.topology_lock.lock().await;
        if self.is_closed() {
            trace!("Pool is closed, ignoring host list");
            return;
        }

        let (to_remove, to_create) = {
            let pools = self.host_pools.read().unwrap();
            let mut to_remove: HashSet<String> = pools.keys().cloned().collect();
            let mut seen: HashSet<&str> = HashSet::new();
            let mut to_create = Vec::new();

            for host in hosts {
                if !host.is_up() || !seen.insert(host.peer()) {
                    continue;
                }
                if pools.contains_key(host.peer()) {
                    to_remove.remove(host.peer());
                } else {
                    to_create.push(Arc::clone(host));
                }
            }
            (to_remove, to_create)
        };

        debug!(
            "Updating hosts: creating {} pools, closing {}",
            to_create.len(),
            to_remove.len()
        );
        let created = futures::future::join_all(
            to_create
                .into_iter()
                .map(|host| self.create_host_pool(host)),
        )
        .await;

        let mut discarded = Vec::new();
        {
            let mut pools = self.host_pools.write().unwrap();
            if self.is_closed() {
                discarded = created;
            } else {
                for pool in created {
                    if pool.size() > 0 {
                        pools.insert(pool.host().peer().to_owned(), pool);
                    } else {
                        discarded.push(pool);
                    }
                }
                for peer in &to_remove {
                    if let Some(pool) = pools.remove(peer) {
                        discarded.push(pool);
                    }
                }
                self.host_policy.set_hosts(hosts);
            }
        }

        for pool in discarded {
            debug!("[{}] Not tracking host anymore", pool.host());
            pool.close();
        }
    }

    async fn add_host(&self, host: Arc<HostInfo>) {
        let _topology = self.topology_lock.lock().await;
        if self.is_closed() {
            trace!("[{}] Pool is closed, ignoring new host", host);
            return;
        }

        let existing = self.host_pools.read().unwrap().get(host.peer()).cloned();
        if let Some(pool) = existing {
            trace!("[{}] Host is tracked already, refilling its pool", host);
            pool.fill().await;
            return;
        }

        let created = if host.is_up() {
            Some(self.create_host_pool(Arc::clone(&host)).await)
        } else {
            None
        };

        let discarded = {
            let mut pools = self.host_pools.write().unwrap();
            if self.is_closed() {
                created
            } else {
                let discarded = match created {
                    Some(pool) if pool.size() > 0 => {
                        debug!("[{}] Tracking new host", host);
                        pools.insert(host.peer().to_owned(), pool);
                        None
                    }
                    other => other,
                };
                self.host_policy.add_host(host);
                discarded
            }
        };

        if let Some(pool) = discarded {
            pool.close();
        }
    }

    async fn remove_host(&self, peer: &str) {
        self.host_policy.remove_host(peer);

        let _topology = self.topology_lock.lock().await;
        self.close_host_pool(peer);
    }

    // Unlike `remove_host`, the policy is updated under the topology lock, so that
    // a concurrent `set_hosts` or `add_host` announcing the host cannot undo it.
    async fn host_unreachable(&self, peer: &str, pool: &HostConnectionPool) {
        let _topology = self.topology_lock.lock().await;

        // A newer pool for the same host may have connected in the meantime.
        let replaced = self
            .host_pools
            .read()
            .unwrap()
            .get(peer)
            .is_some_and(|current| !current.is_same_pool(pool) && current.size() > 0);
        if replaced {
            trace!("[{}] Ignoring stale unreachable host notification", peer);
            return;
        }

        debug!("[{}] Host is unreachable, marking it down", peer);
        self.host_policy.remove_host(peer);
        self.close_host_pool(peer);
    }

    fn close_host_pool(&self, peer: &str) {
        let removed = self.host_pools.write().unwrap().remove(peer);
        if let Some(pool) = removed {
            debug!("[{}] Removing host", pool.host());
            pool.close();
        }
    }
}

// Marks hosts down when their pool reports them unreachable. Runs until the
// pool is dropped.
async fn unreachable_hosts_worker(
    inner: Weak<PolicyPoolInner>,
    mut receiver: mpsc::UnboundedReceiver<HostUnreachable>,
) {
    while let Some(HostUnreachable { peer, pool }) = receiver.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.host_unreachable(&peer, &pool).await;
    }
    trace!("Unreachable hosts worker finished");
}
