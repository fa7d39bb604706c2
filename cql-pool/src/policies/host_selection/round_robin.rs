use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use itertools::Itertools;
use tracing::trace;

use super::{with_host_added, with_host_removed, HostPlan, HostSelectionPolicy, SelectedHost};
use crate::cluster::HostInfo;
use crate::policies::rotated;
use crate::routing::RoutingInfo;

/// A round-robin host selection policy.
///
/// Each plan contains every up host exactly once, starting one position further
/// than the previous plan.
#[derive(Debug)]
pub struct RoundRobinHostPolicy {
    hosts: ArcSwap<Vec<Arc<HostInfo>>>,
    index: AtomicUsize,
}

impl RoundRobinHostPolicy {
    /// Creates a policy with no known hosts.
    pub fn new() -> Self {
        Self {
            hosts: ArcSwap::from_pointee(Vec::new()),
            index: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinHostPolicy {
    fn default() -> Self {
        Self::new()
    }
}

const ORDER_TYPE: Ordering = Ordering::Relaxed;

impl HostSelectionPolicy for RoundRobinHostPolicy {
    fn pick<'a>(&'a self, _info: &RoutingInfo<'_>) -> HostPlan<'a> {
        let hosts = self.hosts.load_full();
        let index = self.index.fetch_add(1, ORDER_TYPE);

        let plan: Vec<Arc<HostInfo>> = rotated(&hosts, index)
            .filter(|host| host.is_up())
            .collect();
        trace!(
            hosts = plan.iter().map(|host| host.peer()).join(",").as_str(),
            "RoundRobin"
        );

        Box::new(
            plan.into_iter()
                .map(|host| Box::new(host) as Box<dyn SelectedHost>),
        )
    }

    fn set_hosts(&self, hosts: &[Arc<HostInfo>]) {
        self.hosts.store(Arc::new(hosts.to_vec()));
    }

    fn add_host(&self, host: Arc<HostInfo>) {
        self.hosts
            .rcu(|hosts| with_host_added(hosts, Arc::clone(&host)));
    }

    fn remove_host(&self, peer: &str) {
        self.hosts.rcu(|hosts| with_host_removed(hosts, peer));
    }

    fn name(&self) -> String {
        "RoundRobinHostPolicy".to_string()
    }
}
