//! Connections to a single node and the per-host pool that keeps them open.
//!
//! This module holds the [Connection] and [Connector] contracts the pool is written
//! against, and [HostConnectionPool], which maintains a fixed number of connections
//! to one host.

mod connection;
mod connection_pool;

pub use connection::{
    Connection, ConnectionConfig, ConnectionErrorHandler, Connector, VerifiedKeyspaceName,
};
pub use connection_pool::{HostConnectionPool, PoolConfig};
pub(crate) use connection_pool::{HostUnreachable, HostUnreachableSender};
