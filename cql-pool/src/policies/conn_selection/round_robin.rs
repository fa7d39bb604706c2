use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::ConnSelectionPolicy;
use crate::network::Connection;
use crate::routing::RoutingInfo;

/// Hands out the connections of a host in turn.
#[derive(Debug)]
pub struct RoundRobinConnPolicy {
    conns: ArcSwap<Vec<Arc<dyn Connection>>>,
    pos: AtomicUsize,
}

impl RoundRobinConnPolicy {
    /// Creates a policy with an empty working set.
    pub fn new() -> Self {
        Self {
            conns: ArcSwap::from_pointee(Vec::new()),
            pos: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinConnPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnSelectionPolicy for RoundRobinConnPolicy {
    fn pick(&self, _info: &RoutingInfo<'_>) -> Option<Arc<dyn Connection>> {
        let conns = self.conns.load();
        if conns.is_empty() {
            return None;
        }
        let pos = self.pos.fetch_add(1, Ordering::Relaxed);
        conns.get(pos % conns.len()).cloned()
    }

    fn set_conns(&self, conns: Vec<Arc<dyn Connection>>) {
        self.conns.store(Arc::new(conns));
    }

    fn name(&self) -> String {
        "RoundRobinConnPolicy".to_string()
    }
}
