//! This module holds entities that represent the cluster as a whole:
//! - hosts as seen by the topology layer ([HostInfo]),
//! - the cluster-wide, policy-driven pool ([PolicyConnectionPool]),
//!   which keeps one [HostConnectionPool](crate::network::HostConnectionPool) per live host,
//! - [PolicyConnectionPoolBuilder], the usual way to create the pool.

mod builder;
pub use builder::{PolicyConnectionPoolBuilder, DEFAULT_PORT};

mod host;
pub use host::{HostInfo, HostState};

mod pool;
pub use pool::PolicyConnectionPool;
