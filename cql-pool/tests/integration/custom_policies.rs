use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cql_pool::network::Connection;
use cql_pool::policies::conn_selection::{ConnSelectionPolicy, ConnSelectionPolicyFactory};
use cql_pool::policies::host_selection::{HostPlan, HostSelectionPolicy, SelectedHost};
use cql_pool::routing::RoutingInfo;
use cql_pool::{HostInfo, PolicyConnectionPoolBuilder};
use itertools::Itertools;

use crate::utils::{setup_tracing, SimulatedCluster};

/// Always prefers the host with the greatest address.
#[derive(Debug, Default)]
struct FixedOrderHostPolicy {
    hosts: Mutex<Vec<Arc<HostInfo>>>,
}

impl HostSelectionPolicy for FixedOrderHostPolicy {
    fn pick<'a>(&'a self, _info: &RoutingInfo<'_>) -> HostPlan<'a> {
        let hosts = self.hosts.lock().unwrap().clone();
        Box::new(
            hosts
                .into_iter()
                .filter(|host| host.is_up())
                .sorted_by(|a, b| b.peer().cmp(a.peer()))
                .map(|host| Box::new(host) as Box<dyn SelectedHost>),
        )
    }

    fn set_hosts(&self, hosts: &[Arc<HostInfo>]) {
        *self.hosts.lock().unwrap() = hosts.to_vec();
    }

    fn add_host(&self, host: Arc<HostInfo>) {
        let mut hosts = self.hosts.lock().unwrap();
        hosts.retain(|known| known.peer() != host.peer());
        hosts.push(host);
    }

    fn remove_host(&self, peer: &str) {
        self.hosts.lock().unwrap().retain(|known| known.peer() != peer);
    }

    fn name(&self) -> String {
        "FixedOrderHostPolicy".to_string()
    }
}

/// Always hands out the first connection and counts the calls.
#[derive(Debug)]
struct FirstConnPolicy {
    conns: Mutex<Vec<Arc<dyn Connection>>>,
    picks: Arc<AtomicUsize>,
}

impl ConnSelectionPolicy for FirstConnPolicy {
    fn pick(&self, _info: &RoutingInfo<'_>) -> Option<Arc<dyn Connection>> {
        self.picks.fetch_add(1, Ordering::Relaxed);
        self.conns.lock().unwrap().first().cloned()
    }

    fn set_conns(&self, conns: Vec<Arc<dyn Connection>>) {
        *self.conns.lock().unwrap() = conns;
    }

    fn name(&self) -> String {
        "FirstConnPolicy".to_string()
    }
}

/// A policy without host info breaks the contract of [SelectedHost].
#[derive(Debug)]
struct AnonymousHost;

impl SelectedHost for AnonymousHost {
    fn info(&self) -> Option<&Arc<HostInfo>> {
        None
    }
}

#[derive(Debug)]
struct BrokenHostPolicy;

impl HostSelectionPolicy for BrokenHostPolicy {
    fn pick<'a>(&'a self, _info: &RoutingInfo<'_>) -> HostPlan<'a> {
        Box::new(std::iter::once(Box::new(AnonymousHost) as Box<dyn SelectedHost>))
    }

    fn set_hosts(&self, _hosts: &[Arc<HostInfo>]) {}

    fn add_host(&self, _host: Arc<HostInfo>) {}

    fn remove_host(&self, _peer: &str) {}

    fn name(&self) -> String {
        "BrokenHostPolicy".to_string()
    }
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn custom_policies_drive_selection() {
    setup_tracing();
    let cluster = SimulatedCluster::new();
    let picks = Arc::new(AtomicUsize::new(0));
    let factory: ConnSelectionPolicyFactory = {
        let picks = Arc::clone(&picks);
        Arc::new(move || {
            Box::new(FirstConnPolicy {
                conns: Mutex::new(Vec::new()),
                picks: Arc::clone(&picks),
            })
        })
    };

    let pool = PolicyConnectionPoolBuilder::new(cluster.connector())
        .known_nodes(["10.0.0.1", "10.0.0.2", "10.0.0.3"])
        .pool_size(NonZeroUsize::new(3).unwrap())
        .host_selection_policy(Arc::new(FixedOrderHostPolicy::default()))
        .conn_selection_policy(factory)
        .connect()
        .await
        .unwrap();

    let first = pool.pick(&RoutingInfo::default()).unwrap();
    assert_eq!(first.0.info().unwrap().peer(), "10.0.0.3");
    for _ in 0..5 {
        let (selected, conn) = pool.pick(&RoutingInfo::default()).unwrap();
        assert_eq!(selected.info().unwrap().peer(), "10.0.0.3");
        assert!(Arc::ptr_eq(&conn, &first.1));
    }
    assert_eq!(picks.load(Ordering::Relaxed), 6);

    pool.remove_host("10.0.0.3").await;
    let (selected, conn) = pool.pick(&RoutingInfo::default()).unwrap();
    assert_eq!(selected.info().unwrap().peer(), "10.0.0.2");
    assert_eq!(conn.connect_address(), "10.0.0.2:9042");
}

#[tokio::test]
#[should_panic(expected = "BrokenHostPolicy")]
async fn candidate_without_host_info_panics() {
    let cluster = SimulatedCluster::new();
    let pool = PolicyConnectionPoolBuilder::new(cluster.connector())
        .host_selection_policy(Arc::new(BrokenHostPolicy))
        .build()
        .unwrap();

    pool.pick(&RoutingInfo::default());
}
