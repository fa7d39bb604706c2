//! Connection selection policies choose one of the live connections to a single host.
//!
//! Every [HostConnectionPool](crate::network::HostConnectionPool) owns its own policy
//! instance, created by a [ConnSelectionPolicyFactory]. The pool publishes a fresh copy of
//! its connection list with [set_conns](ConnSelectionPolicy::set_conns) after every change.

use std::sync::Arc;

use crate::network::Connection;
use crate::routing::RoutingInfo;

mod round_robin;

pub use round_robin::RoundRobinConnPolicy;

/// Policy that picks a connection to one host for a request.
pub trait ConnSelectionPolicy: Send + Sync + std::fmt::Debug {
    /// Returns a connection for the request, or `None` if there is none.
    fn pick(&self, info: &RoutingInfo<'_>) -> Option<Arc<dyn Connection>>;

    /// Replaces the working set of connections.
    fn set_conns(&self, conns: Vec<Arc<dyn Connection>>);

    /// Returns the name of the policy.
    fn name(&self) -> String;
}

/// Creates a fresh [ConnSelectionPolicy] for each new host pool.
pub type ConnSelectionPolicyFactory = Arc<dyn Fn() -> Box<dyn ConnSelectionPolicy> + Send + Sync>;

/// Factory producing [RoundRobinConnPolicy] instances.
pub fn round_robin_conn_policy() -> ConnSelectionPolicyFactory {
    Arc::new(|| Box::new(RoundRobinConnPolicy::new()))
}
