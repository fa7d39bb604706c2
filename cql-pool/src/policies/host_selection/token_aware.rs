use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::{debug, trace, warn};

use super::{with_host_added, with_host_removed, HostPlan, HostSelectionPolicy, SelectedHost};
use crate::cluster::HostInfo;
use crate::routing::{PartitionerName, RoutingInfo, Token};

/// Hosts together with the ring built from their tokens. Swapped as a whole,
/// so the ring never disagrees with the host list.
#[derive(Debug, Default)]
struct TokenRing {
    hosts: Vec<Arc<HostInfo>>,
    ring: Vec<(Token, Arc<HostInfo>)>,
}

impl TokenRing {
    fn new(hosts: Vec<Arc<HostInfo>>) -> Self {
        let mut ring: Vec<(Token, Arc<HostInfo>)> = hosts
            .iter()
            .flat_map(|host| host.tokens().iter().map(move |token| (*token, Arc::clone(host))))
            .collect();
        ring.sort_by_key(|(token, _)| *token);
        Self { hosts, ring }
    }

    // The owner of `token` is the first host at or after it on the ring, wrapping around.
    fn primary_replica(&self, token: Token) -> Option<&Arc<HostInfo>> {
        let idx = self.ring.partition_point(|(t, _)| *t < token);
        self.ring
            .get(idx)
            .or_else(|| self.ring.first())
            .map(|(_, host)| host)
    }
}

/// A wrapper host selection policy that adds token awareness to a fallback policy.
///
/// When the token of a request can be determined, the node owning it comes first
/// in the plan, followed by the fallback policy's plan without that node.
/// Otherwise the plan is exactly the fallback's.
#[derive(Debug)]
pub struct TokenAwareHostPolicy {
    fallback: Arc<dyn HostSelectionPolicy>,
    partitioner: ArcSwapOption<PartitionerName>,
    ring: ArcSwap<TokenRing>,
}

impl TokenAwareHostPolicy {
    /// Wraps `fallback`. The partitioner is unknown until
    /// [set_partitioner](HostSelectionPolicy::set_partitioner) is called.
    pub fn new(fallback: Arc<dyn HostSelectionPolicy>) -> Self {
        Self {
            fallback,
            partitioner: ArcSwapOption::empty(),
            ring: ArcSwap::from_pointee(TokenRing::default()),
        }
    }
}

impl HostSelectionPolicy for TokenAwareHostPolicy {
    fn pick<'a>(&'a self, info: &RoutingInfo<'_>) -> HostPlan<'a> {
        let partitioner = self.partitioner.load();
        let Some(token) = info.compute_token(partitioner.as_deref()) else {
            return self.fallback.pick(info);
        };

        let ring = self.ring.load();
        let replica = match ring.primary_replica(token) {
            Some(replica) if replica.is_up() => Arc::clone(replica),
            _ => return self.fallback.pick(info),
        };
        trace!(token = token.value(), replica = replica.peer(), "TokenAware");

        let replica_peer = replica.peer().to_owned();
        let rest = self.fallback.pick(info).filter(move |candidate| {
            candidate
                .info()
                .map_or(true, |host| host.peer() != replica_peer)
        });

        Box::new(std::iter::once(Box::new(replica) as Box<dyn SelectedHost>).chain(rest))
    }

    fn set_hosts(&self, hosts: &[Arc<HostInfo>]) {
        self.ring.store(Arc::new(TokenRing::new(hosts.to_vec())));
        self.fallback.set_hosts(hosts);
    }

    fn add_host(&self, host: Arc<HostInfo>) {
        self.ring
            .rcu(|ring| TokenRing::new(with_host_added(&ring.hosts, Arc::clone(&host))));
        self.fallback.add_host(host);
    }

    fn remove_host(&self, peer: &str) {
        self.ring
            .rcu(|ring| TokenRing::new(with_host_removed(&ring.hosts, peer)));
        self.fallback.remove_host(peer);
    }

    fn set_partitioner(&self, partitioner: &str) {
        match PartitionerName::from_str(partitioner) {
            Some(name) => {
                debug!("Token aware routing uses partitioner {:?}", name);
                self.partitioner.store(Some(Arc::new(name)));
            }
            None => {
                warn!(
                    "Unsupported partitioner {}, token aware routing is disabled",
                    partitioner
                );
                self.partitioner.store(None);
            }
        }
        self.fallback.set_partitioner(partitioner);
    }

    fn name(&self) -> String {
        format!(
            "TokenAwareHostPolicy{{fallback: {}}}",
            self.fallback.name()
        )
    }
}
