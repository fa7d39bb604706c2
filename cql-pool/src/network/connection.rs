use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{BadKeyspaceName, ConnectionError};

/// One established link to a single node.
///
/// The pool only needs to select a keyspace on a fresh connection and to close
/// it; everything else (framing, requests, authentication) is up to the
/// implementation.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Address the connection was opened to.
    fn connect_address(&self) -> &str;

    /// Makes subsequent requests on this connection operate on `keyspace`.
    async fn use_keyspace(&self, keyspace: &VerifiedKeyspaceName) -> Result<(), ConnectionError>;

    /// Closes the connection. Must be idempotent and must not block.
    fn close(&self);
}

/// Opens connections on behalf of the pool.
///
/// TLS and authentication parameters are configured on the connector itself
/// and are opaque to the pool.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Dials `address` (`host:port`) and performs the connection handshake.
    ///
    /// The returned connection must report every failure to `error_handler`,
    /// passing itself as the first argument.
    async fn connect(
        &self,
        address: &str,
        config: &ConnectionConfig,
        error_handler: Arc<dyn ConnectionErrorHandler>,
    ) -> Result<Arc<dyn Connection>, ConnectionError>;
}

/// Receives failures of established connections.
pub trait ConnectionErrorHandler: Send + Sync {
    /// Called by a connection when it encounters `error`.
    ///
    /// `closed` tells whether the connection is terminally broken; errors on
    /// a still usable connection are informational.
    fn handle_error(&self, connection: &dyn Connection, error: &ConnectionError, closed: bool);
}

// Connections are compared by the address of the object, since `dyn Connection`
// carries no identity of its own.
pub(crate) fn is_same_connection(held: &Arc<dyn Connection>, reported: &dyn Connection) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(held), reported as *const dyn Connection)
}

/// Configuration handed to the [Connector] for every new connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on dialing a node and on selecting the keyspace afterwards.
    pub connect_timeout: Duration,
    /// Whether to set TCP_NODELAY on the socket.
    pub tcp_nodelay: bool,
    /// Interval of TCP keepalive probes, if enabled.
    pub tcp_keepalive_interval: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
            tcp_keepalive_interval: None,
        }
    }
}

/// This type can only hold a valid keyspace name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VerifiedKeyspaceName {
    name: Arc<String>,
    is_case_sensitive: bool,
}

impl VerifiedKeyspaceName {
    /// Validates `keyspace_name`.
    pub fn new(keyspace_name: String, case_sensitive: bool) -> Result<Self, BadKeyspaceName> {
        Self::verify_keyspace_name_is_valid(&keyspace_name)?;

        Ok(VerifiedKeyspaceName {
            name: Arc::new(keyspace_name),
            is_case_sensitive: case_sensitive,
        })
    }

    /// The keyspace name.
    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }

    /// Whether the name must be quoted when sent to the node.
    pub fn is_case_sensitive(&self) -> bool {
        self.is_case_sensitive
    }

    // Keyspace names can have up to 48 alphanumeric characters and underscores.
    // Cassandra accepts an underscore as the first character, so we do too.
    fn verify_keyspace_name_is_valid(keyspace_name: &str) -> Result<(), BadKeyspaceName> {
        if keyspace_name.is_empty() {
            return Err(BadKeyspaceName::Empty);
        }

        let keyspace_name_len = keyspace_name.chars().count();
        if keyspace_name_len > 48 {
            return Err(BadKeyspaceName::TooLong(
                keyspace_name.to_string(),
                keyspace_name_len,
            ));
        }

        if let Some(character) = keyspace_name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(BadKeyspaceName::IllegalCharacter(
                keyspace_name.to_string(),
                character,
            ));
        }

        Ok(())
    }
}
