//! Host selection policies decide which nodes a request may be sent to, and in which order.
//!
//! The [PolicyConnectionPool](crate::cluster::PolicyConnectionPool) keeps the policy informed
//! about the topology (`set_hosts`, `add_host`, `remove_host`) and asks it for a plan on every
//! request. The plan is walked lazily: the pool stops at the first host that yields a connection.

use std::sync::Arc;

use crate::cluster::HostInfo;
use crate::errors::ConnectionError;
use crate::routing::RoutingInfo;

mod round_robin;
mod token_aware;

pub use round_robin::RoundRobinHostPolicy;
pub use token_aware::TokenAwareHostPolicy;

/// A candidate host produced by a [HostSelectionPolicy].
pub trait SelectedHost: Send + Sync + std::fmt::Debug {
    /// The host to try. A policy must never yield a candidate without one.
    fn info(&self) -> Option<&Arc<HostInfo>>;

    /// Reports the outcome of using this host, so that adaptive policies can
    /// learn from it. `None` means success.
    fn mark(&self, _error: Option<&ConnectionError>) {}
}

impl SelectedHost for Arc<HostInfo> {
    fn info(&self) -> Option<&Arc<HostInfo>> {
        Some(self)
    }
}

/// Ordered candidates for one request. `None` means the plan is exhausted.
pub type HostPlan<'a> = Box<dyn Iterator<Item = Box<dyn SelectedHost>> + Send + 'a>;

/// Policy that decides which hosts to contact for each request.
///
/// Implementations are shared between all requests and topology events,
/// so every method takes `&self` and must be safe to call concurrently.
pub trait HostSelectionPolicy: Send + Sync + std::fmt::Debug {
    /// Returns the ordered candidates for the request described by `info`.
    fn pick<'a>(&'a self, info: &RoutingInfo<'_>) -> HostPlan<'a>;

    /// Replaces the known hosts with `hosts`.
    fn set_hosts(&self, hosts: &[Arc<HostInfo>]);

    /// Adds (or replaces) a single host.
    fn add_host(&self, host: Arc<HostInfo>);

    /// Forgets the host with the given peer address.
    fn remove_host(&self, peer: &str);

    /// Informs the policy about the partitioner used by the cluster.
    fn set_partitioner(&self, _partitioner: &str) {}

    /// Returns the name of the policy.
    fn name(&self) -> String;
}

// Shared host bookkeeping of the bundled policies: copy-on-write list of hosts.
pub(crate) fn with_host_added(hosts: &[Arc<HostInfo>], host: Arc<HostInfo>) -> Vec<Arc<HostInfo>> {
    let mut new_hosts: Vec<Arc<HostInfo>> = hosts
        .iter()
        .filter(|known| known.peer() != host.peer())
        .cloned()
        .collect();
    new_hosts.push(host);
    new_hosts
}

pub(crate) fn with_host_removed(hosts: &[Arc<HostInfo>], peer: &str) -> Vec<Arc<HostInfo>> {
    hosts
        .iter()
        .filter(|known| known.peer() != peer)
        .cloned()
        .collect()
}
