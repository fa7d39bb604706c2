//! Client-side connection pool for Cassandra-compatible clusters.
//!
//! The pool keeps a fixed number of connections open to every live node and decides,
//! for each request, which node and which connection to use:
//! - a [HostSelectionPolicy](policies::host_selection::HostSelectionPolicy) orders the
//!   candidate nodes (round robin, or token aware on top of another policy),
//! - every node has its own [HostConnectionPool](network::HostConnectionPool), which
//!   refills itself in the background and forgets broken connections,
//! - a [ConnSelectionPolicy](policies::conn_selection::ConnSelectionPolicy) picks one of
//!   the node's connections.
//!
//! The pool does not speak the wire protocol. Connections are opened by a user-provided
//! [Connector](network::Connector).
//!
//! ```rust,no_run
//! use cql_pool::network::{Connection, Connector};
//! use cql_pool::routing::RoutingInfo;
//! use cql_pool::PolicyConnectionPoolBuilder;
//! use std::error::Error;
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//!
//! async fn run(connector: Arc<dyn Connector>) -> Result<(), Box<dyn Error>> {
//!     let pool = PolicyConnectionPoolBuilder::new(connector)
//!         .known_node("127.0.0.1:9042")
//!         .known_node("1.2.3.4")
//!         .pool_size(NonZeroUsize::new(4).unwrap())
//!         .connect()
//!         .await?;
//!
//!     if let Some((_host, connection)) = pool.pick(&RoutingInfo::default()) {
//!         println!("Sending to {}", connection.connect_address());
//!     }
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```
//!
//! Cluster membership is not tracked by the pool itself: whoever follows the
//! cluster's topology calls [set_hosts](PolicyConnectionPool::set_hosts),
//! [host_up](PolicyConnectionPool::host_up) and
//! [host_down](PolicyConnectionPool::host_down).

pub mod cluster;
pub mod errors;
pub mod network;
pub mod policies;
pub mod routing;


#[cfg(test)]
pub(crate) use utils::test_utils;

pub use cluster::{HostInfo, PolicyConnectionPool, PolicyConnectionPoolBuilder};
pub use network::HostConnectionPool;
