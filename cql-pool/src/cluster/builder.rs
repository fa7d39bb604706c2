//! Builder of [PolicyConnectionPool].

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{HostInfo, PolicyConnectionPool};
use crate::errors::NewPoolError;
use crate::network::{Connector, PoolConfig, VerifiedKeyspaceName};
use crate::policies::conn_selection::{round_robin_conn_policy, ConnSelectionPolicyFactory};
use crate::policies::host_selection::{HostSelectionPolicy, RoundRobinHostPolicy};

/// Port dialed when a known node does not name one.
pub const DEFAULT_PORT: u16 = 9042;

/// PolicyConnectionPoolBuilder is used to create new [PolicyConnectionPool] instances
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use cql_pool::cluster::{PolicyConnectionPool, PolicyConnectionPoolBuilder};
/// # use cql_pool::network::Connector;
/// # async fn example(connector: Arc<dyn Connector>) -> Result<(), Box<dyn std::error::Error>> {
/// let pool: PolicyConnectionPool = PolicyConnectionPoolBuilder::new(connector)
///     .known_node("127.0.0.1:9042")
///     .use_keyspace("my_keyspace", false)
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct PolicyConnectionPoolBuilder {
    connector: Arc<dyn Connector>,
    known_nodes: Vec<String>,
    port: u16,
    pool_config: PoolConfig,
    keyspace: Option<(String, bool)>,
    host_policy: Option<Arc<dyn HostSelectionPolicy>>,
    conn_policy_factory: Option<ConnSelectionPolicyFactory>,
}

impl PolicyConnectionPoolBuilder {
    /// Creates a builder with default configuration. Connections are opened
    /// with `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            known_nodes: Vec::new(),
            port: DEFAULT_PORT,
            pool_config: PoolConfig::default(),
            keyspace: None,
            host_policy: None,
            conn_policy_factory: None,
        }
    }

    /// Add a known node, either as `host` or `host:port`.
    pub fn known_node(mut self, hostname: impl AsRef<str>) -> Self {
        self.known_nodes.push(hostname.as_ref().to_owned());
        self
    }

    /// Add a list of known nodes, see [known_node](Self::known_node).
    pub fn known_nodes(mut self, hostnames: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.known_nodes
            .extend(hostnames.into_iter().map(|node| node.as_ref().to_owned()));
        self
    }

    /// Port used for known nodes given without one. The default is 9042.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Number of connections kept open to every host. The default is 2.
    pub fn pool_size(mut self, size: NonZeroUsize) -> Self {
        self.pool_config.pool_size = size;
        self
    }

    /// Select a keyspace on every new connection.
    /// The name is validated when the pool is built.
    pub fn use_keyspace(mut self, keyspace_name: impl Into<String>, case_sensitive: bool) -> Self {
        self.keyspace = Some((keyspace_name.into(), case_sensitive));
        self
    }

    /// Upper bound on opening a connection and selecting the keyspace on it.
    /// The default is 5 seconds.
    ///
    /// # Example
    /// ```
    /// # use std::sync::Arc;
    /// # use std::time::Duration;
    /// # use cql_pool::cluster::PolicyConnectionPoolBuilder;
    /// # use cql_pool::network::Connector;
    /// # async fn example(connector: Arc<dyn Connector>) -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = PolicyConnectionPoolBuilder::new(connector)
    ///     .known_node("127.0.0.1:9042")
    ///     .connection_timeout(Duration::from_secs(30))
    ///     .connect()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.pool_config.connection_config.connect_timeout = duration;
        self
    }

    /// Set the nodelay TCP flag. The default is true.
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.pool_config.connection_config.tcp_nodelay = nodelay;
        self
    }

    /// Set the TCP keepalive interval.
    /// The default is `None`, which implies that no keepalive messages
    /// are sent on the TCP layer when a connection is idle.
    pub fn tcp_keepalive_interval(mut self, interval: Duration) -> Self {
        self.pool_config.connection_config.tcp_keepalive_interval = Some(interval);
        self
    }

    /// Policy choosing the hosts for every request.
    /// The default is [RoundRobinHostPolicy].
    pub fn host_selection_policy(mut self, policy: Arc<dyn HostSelectionPolicy>) -> Self {
        self.host_policy = Some(policy);
        self
    }

    /// Factory of the policies choosing a connection within one host.
    /// The default produces [RoundRobinConnPolicy](crate::policies::conn_selection::RoundRobinConnPolicy).
    pub fn conn_selection_policy(mut self, factory: ConnSelectionPolicyFactory) -> Self {
        self.conn_policy_factory = Some(factory);
        self
    }

    /// Validates the configuration and creates a pool that tracks no hosts yet.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Result<PolicyConnectionPool, NewPoolError> {
        let mut pool_config = self.pool_config;
        if let Some((name, case_sensitive)) = self.keyspace {
            pool_config.keyspace = Some(VerifiedKeyspaceName::new(name, case_sensitive)?);
        }

        Ok(PolicyConnectionPool::with_known_nodes(
            pool_config,
            self.known_nodes,
            self.connector,
            self.host_policy
                .unwrap_or_else(|| Arc::new(RoundRobinHostPolicy::new())),
            self.conn_policy_factory
                .unwrap_or_else(round_robin_conn_policy),
        ))
    }

    /// Builds the pool and connects to the known nodes.
    ///
    /// Fails if no known node is given or if none of them accepts a connection.
    pub async fn connect(self) -> Result<PolicyConnectionPool, NewPoolError> {
        if self.known_nodes.is_empty() {
            return Err(NewPoolError::EmptyKnownNodesList);
        }

        let port = self.port;
        let hosts: Vec<Arc<HostInfo>> = self
            .known_nodes
            .iter()
            .map(|node| {
                let (peer, port) = split_host_port(node, port);
                Arc::new(HostInfo::new(peer, port))
            })
            .collect();

        let pool = self.build()?;
        pool.set_hosts(&hosts).await;

        if pool.size() == 0 {
            pool.close().await;
            return Err(NewPoolError::NoReachableKnownNode);
        }
        debug!(
            "Connected to {} of {} known nodes",
            pool.tracked_hosts().len(),
            hosts.len()
        );
        Ok(pool)
    }
}

// Accepts `host`, `host:port`, bare IPv6 literals and `[v6]:port`.
fn split_host_port(node: &str, default_port: u16) -> (String, u16) {
    if let Ok(addr) = node.parse::<SocketAddr>() {
        return (addr.ip().to_string(), addr.port());
    }
    if node.parse::<IpAddr>().is_ok() {
        return (node.to_owned(), default_port);
    }
    if let Some((host, port)) = node.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            if !host.is_empty() && !host.contains(':') {
                return (host.to_owned(), port);
            }
        }
    }
    (node.to_owned(), default_port)
}
