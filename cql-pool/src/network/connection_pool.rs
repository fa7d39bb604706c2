use super::connection::{
    is_same_connection, Connection, ConnectionConfig, ConnectionErrorHandler, Connector,
    VerifiedKeyspaceName,
};

use crate::cluster::HostInfo;
use crate::errors::{ConnectionError, UseKeyspaceError};
use crate::policies::conn_selection::ConnSelectionPolicy;
use crate::routing::RoutingInfo;

use rand::Rng;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

// Bounds of the random pause between the end of a fill and the next one.
const FILL_COOLDOWN_MIN_MS: u64 = 31;
const FILL_COOLDOWN_MAX_MS: u64 = 130;

/// Settings shared by all per-host pools of a [PolicyConnectionPool](crate::cluster::PolicyConnectionPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Passed to the connector on every dial.
    pub connection_config: ConnectionConfig,
    /// Number of connections kept open to every host.
    pub pool_size: NonZeroUsize,
    /// Keyspace selected on every new connection before it is handed out.
    pub keyspace: Option<VerifiedKeyspaceName>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connection_config: Default::default(),
            pool_size: NonZeroUsize::new(2).unwrap(),
            keyspace: None,
        }
    }
}

/// Sent when the first connection of a fill to an empty pool could not be opened.
#[derive(Debug)]
pub(crate) struct HostUnreachable {
    pub(crate) peer: String,
    pub(crate) pool: HostConnectionPool,
}

pub(crate) type HostUnreachableSender = mpsc::UnboundedSender<HostUnreachable>;

/// A fixed-size set of connections to one host.
///
/// The pool never blocks a request on dialing: when it is short of connections,
/// [pick](Self::pick) schedules a refill in the background and answers with what
/// it already has. Broken connections are reported by the connections themselves
/// and are dropped from the pool immediately.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct HostConnectionPool {
    shared: Arc<HostPoolShared>,
}

struct HostPoolShared {
    host: Arc<HostInfo>,
    address: String,
    size: usize,
    keyspace: Option<VerifiedKeyspaceName>,
    connection_config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    policy: Box<dyn ConnSelectionPolicy>,
    state: RwLock<PoolState>,
    unreachable_sender: Option<HostUnreachableSender>,
    // Background work is spawned here, so connections may report errors from any thread.
    runtime: Handle,
}

impl Drop for HostPoolShared {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for conn in std::mem::take(&mut state.conns) {
            conn.close();
        }
    }
}

#[derive(Default)]
struct PoolState {
    conns: Vec<Arc<dyn Connection>>,
    closed: bool,
    filling: bool,
}

// Handed to every connection of the pool. Holds the pool weakly so that
// connections do not keep a dropped pool alive.
struct PoolErrorHandler {
    pool: Weak<HostPoolShared>,
}

impl ConnectionErrorHandler for PoolErrorHandler {
    fn handle_error(&self, connection: &dyn Connection, error: &ConnectionError, closed: bool) {
        if let Some(shared) = self.pool.upgrade() {
            HostConnectionPool { shared }.handle_error(connection, error, closed);
        }
    }
}

impl HostConnectionPool {
    /// Creates an empty pool for `host`. No connection is opened until the first
    /// [fill](Self::fill) or [pick](Self::pick).
    ///
    /// Must be called within a Tokio runtime; the pool's background work runs on it.
    /// Connections still held when the last handle to the pool is dropped are closed.
    pub fn new(
        host: Arc<HostInfo>,
        config: &PoolConfig,
        connector: Arc<dyn Connector>,
        policy: Box<dyn ConnSelectionPolicy>,
    ) -> Self {
        Self::with_unreachable_sender(host, config, connector, policy, None)
    }

    pub(crate) fn with_unreachable_sender(
        host: Arc<HostInfo>,
        config: &PoolConfig,
        connector: Arc<dyn Connector>,
        policy: Box<dyn ConnSelectionPolicy>,
        unreachable_sender: Option<HostUnreachableSender>,
    ) -> Self {
        let address = host.connect_address(host.port());
        Self {
            shared: Arc::new(HostPoolShared {
                host,
                address,
                size: config.pool_size.get(),
                keyspace: config.keyspace.clone(),
                connection_config: config.connection_config.clone(),
                connector,
                policy,
                state: RwLock::new(PoolState::default()),
                unreachable_sender,
                runtime: Handle::current(),
            }),
        }
    }

    /// Selects a connection for a request.
    ///
    /// Returns `None` if the pool is closed or has no connections. If the pool is
    /// not full, a fill is started in the background.
    pub fn pick(&self, info: &RoutingInfo<'_>) -> Option<Arc<dyn Connection>> {
        let conns = {
            let state = self.shared.state.read().unwrap();
            if state.closed {
                return None;
            }
            state.conns.len()
        };

        if conns < self.shared.size {
            self.spawn_fill();
            if conns == 0 {
                return None;
            }
        }

        self.shared.policy.pick(info)
    }

    /// Number of open connections.
    pub fn size(&self) -> usize {
        self.shared.state.read().unwrap().conns.len()
    }

    /// The host this pool connects to.
    pub fn host(&self) -> &Arc<HostInfo> {
        &self.shared.host
    }

    /// Whether [close](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.read().unwrap().closed
    }

    /// Whether a fill is running or cooling down.
    pub fn is_filling(&self) -> bool {
        self.shared.state.read().unwrap().filling
    }

    /// Closes the pool. Connections are closed in the background; calling this
    /// again has no effect.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.write().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        debug!("[{}] Closing pool", self.shared.address);

        let pool = self.clone();
        self.shared.runtime.spawn(async move { pool.drain() });
    }

    fn drain(&self) {
        let conns = {
            let mut state = self.shared.state.write().unwrap();
            self.shared.policy.set_conns(Vec::new());
            std::mem::take(&mut state.conns)
        };

        trace!(
            "[{}] Closing {} connections of a closed pool",
            self.shared.address,
            conns.len()
        );
        for conn in conns {
            conn.close();
        }
    }

    /// Opens connections until the pool holds its target number of them.
    ///
    /// At most one fill runs at a time; calls made while another fill is running
    /// (or cooling down after one) return immediately. When the pool is empty the
    /// first connection is opened before this returns, so that an unreachable host
    /// is detected right away. Otherwise the work happens in the background.
    pub async fn fill(&self) {
        let shared = &self.shared;
        {
            let state = shared.state.read().unwrap();
            if state.closed || state.filling || state.conns.len() >= shared.size {
                return;
            }
        }

        let (start_count, fill_count) = {
            let mut state = shared.state.write().unwrap();
            let start_count = state.conns.len();
            if state.closed || state.filling || start_count >= shared.size {
                return;
            }
            state.filling = true;
            (start_count, shared.size - start_count)
        };

        debug!(
            "[{}] Filling pool: opening {} connections",
            shared.address, fill_count
        );

        if start_count == 0 {
            if let Err(err) = self.connect().await {
                self.log_connect_error(&err);
                self.filling_stopped().await;
                self.report_unreachable();
                return;
            }

            self.connect_many(fill_count - 1).await;
            self.filling_stopped().await;
            return;
        }

        let pool = self.clone();
        self.shared.runtime.spawn(async move {
            pool.connect_many(fill_count).await;
            pool.filling_stopped().await;
        });
    }

    fn spawn_fill(&self) {
        let pool = self.clone();
        self.shared.runtime.spawn(async move { pool.fill().await });
    }

    async fn connect_many(&self, count: usize) {
        if count == 0 {
            return;
        }

        let results = futures::future::join_all((0..count).map(|_| self.connect())).await;
        for err in results.into_iter().filter_map(Result::err) {
            self.log_connect_error(&err);
        }
    }

    // Consecutive fills of one pool are at least a short random pause apart.
    async fn filling_stopped(&self) {
        let cooldown = Duration::from_millis(
            rand::rng().random_range(FILL_COOLDOWN_MIN_MS..=FILL_COOLDOWN_MAX_MS),
        );
        tokio::time::sleep(cooldown).await;

        self.shared.state.write().unwrap().filling = false;
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        let shared = &self.shared;
        if self.is_closed() {
            return Ok(());
        }

        let timeout = shared.connection_config.connect_timeout;
        let error_handler: Arc<dyn ConnectionErrorHandler> = Arc::new(PoolErrorHandler {
            pool: Arc::downgrade(shared),
        });
        let conn = match tokio::time::timeout(
            timeout,
            shared
                .connector
                .connect(&shared.address, &shared.connection_config, error_handler),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => return Err(ConnectionError::ConnectTimeout),
        };

        if let Some(keyspace) = &shared.keyspace {
            let res = match tokio::time::timeout(timeout, conn.use_keyspace(keyspace)).await {
                Ok(res) => res,
                Err(_) => Err(UseKeyspaceError::RequestTimeout(timeout).into()),
            };
            if let Err(err) = res {
                conn.close();
                return Err(err);
            }
        }

        let mut state = shared.state.write().unwrap();
        if state.closed {
            drop(state);
            trace!(
                "[{}] Pool was closed while connecting, closing new connection",
                shared.address
            );
            conn.close();
            return Ok(());
        }
        if state.conns.len() >= shared.size {
            drop(state);
            trace!("[{}] Pool is already full, closing new connection", shared.address);
            conn.close();
            return Ok(());
        }

        state.conns.push(Arc::clone(&conn));
        shared.policy.set_conns(state.conns.clone());
        trace!(
            "[{}] Added connection {:p}, pool has {} of {}",
            shared.address,
            Arc::as_ptr(&conn),
            state.conns.len(),
            shared.size
        );
        Ok(())
    }

    /// Reacts to a failure reported by one of the pool's connections.
    ///
    /// Only terminal failures (`closed == true`) matter: the connection is removed
    /// from the pool and a refill is scheduled. Reporting the same connection twice
    /// is harmless.
    pub fn handle_error(&self, connection: &dyn Connection, error: &ConnectionError, closed: bool) {
        let shared = &self.shared;
        if !closed {
            trace!(
                "[{}] Connection {:p} reported a non-fatal error: {}",
                shared.address,
                connection as *const dyn Connection,
                error
            );
            return;
        }

        {
            let mut state = shared.state.write().unwrap();
            if state.closed {
                return;
            }

            let Some(idx) = state
                .conns
                .iter()
                .position(|conn| is_same_connection(conn, connection))
            else {
                trace!(
                    "[{}] Broken connection {:p} is not in the pool anymore",
                    shared.address,
                    connection as *const dyn Connection
                );
                return;
            };

            state.conns.swap_remove(idx);
            shared.policy.set_conns(state.conns.clone());
            debug!(
                "[{}] Connection {:p} broken ({}), {} of {} left",
                shared.address,
                connection as *const dyn Connection,
                error,
                state.conns.len(),
                shared.size
            );
        }

        self.spawn_fill();
    }

    fn log_connect_error(&self, err: &ConnectionError) {
        if err.is_expected_during_outage() {
            debug!("[{}] Failed to connect: {}", self.shared.address, err);
        } else {
            warn!("[{}] Failed to connect: {}", self.shared.address, err);
        }
    }

    fn report_unreachable(&self) {
        let Some(sender) = &self.shared.unreachable_sender else {
            return;
        };
        let event = HostUnreachable {
            peer: self.shared.host.peer().to_owned(),
            pool: self.clone(),
        };
        if sender.send(event).is_err() {
            trace!(
                "[{}] Pool owner is gone, dropping unreachable host notification",
                self.shared.address
            );
        }
    }

    pub(crate) fn is_same_pool(&self, other: &HostConnectionPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for HostConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read().unwrap();
        write!(
            f,
            "[filling={} closed={} conns={} size={} host={}]",
            state.filling,
            state.closed,
            state.conns.len(),
            self.shared.size,
            self.shared.host
        )
    }
}
