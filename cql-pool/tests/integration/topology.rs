use std::num::NonZeroUsize;
use std::sync::Arc;

use cql_pool::routing::RoutingInfo;
use cql_pool::{HostInfo, PolicyConnectionPool, PolicyConnectionPoolBuilder};

use crate::utils::{eventually, setup_tracing, SimulatedCluster};

const NODES: [&str; 3] = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];

async fn connect(cluster: &Arc<SimulatedCluster>) -> PolicyConnectionPool {
    PolicyConnectionPoolBuilder::new(cluster.connector())
        .known_nodes(NODES)
        .pool_size(NonZeroUsize::new(2).unwrap())
        .connect()
        .await
        .unwrap()
}

fn picked_addresses(pool: &PolicyConnectionPool, picks: usize) -> Vec<String> {
    (0..picks)
        .filter_map(|_| pool.pick(&RoutingInfo::default()))
        .map(|(_, conn)| conn.connect_address().to_owned())
        .collect()
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn stopped_node_is_dropped_and_comes_back() {
    setup_tracing();
    let cluster = SimulatedCluster::new();
    let pool = connect(&cluster).await;
    assert_eq!(pool.size(), 6);

    cluster.stop("10.0.0.2:9042");
    assert_eq!(pool.size(), 4);

    // Requests keep flowing to the remaining nodes, and picking eventually
    // notices that the stopped node cannot be reconnected.
    eventually(|| {
        for (_, conn) in (0..6).filter_map(|_| pool.pick(&RoutingInfo::default())) {
            assert_ne!(conn.connect_address(), "10.0.0.2:9042");
        }
        pool.tracked_hosts() == vec!["10.0.0.1", "10.0.0.3"]
    })
    .await;
    eventually(|| {
        !picked_addresses(&pool, 6)
            .iter()
            .any(|address| address == "10.0.0.2:9042")
    })
    .await;

    cluster.start("10.0.0.2:9042");
    pool.host_up(Arc::new(HostInfo::new("10.0.0.2", 9042))).await;

    assert_eq!(pool.tracked_hosts(), NODES);
    assert_eq!(pool.size(), 6);
    eventually(|| {
        picked_addresses(&pool, 6)
            .iter()
            .any(|address| address == "10.0.0.2:9042")
    })
    .await;

    pool.close().await;
    eventually(|| cluster.live_connections() == 0).await;
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn broken_connections_are_replaced() {
    setup_tracing();
    let cluster = SimulatedCluster::new();
    let pool = connect(&cluster).await;

    let victim = cluster.live_connections_to("10.0.0.1:9042")[0].clone();
    victim.kill();
    assert_eq!(pool.size(), 5);

    for (_, conn) in (0..12).filter_map(|_| pool.pick(&RoutingInfo::default())) {
        assert!(!std::ptr::addr_eq(Arc::as_ptr(&conn), Arc::as_ptr(&victim)));
    }

    eventually(|| pool.size() == 6).await;
    assert_eq!(cluster.live_connections_to("10.0.0.1:9042").len(), 2);
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn unreachable_known_node_is_skipped() {
    setup_tracing();
    let cluster = SimulatedCluster::new();
    cluster.stop("10.0.0.3:9042");

    let pool = connect(&cluster).await;

    assert_eq!(pool.known_nodes(), NODES);
    assert_eq!(pool.tracked_hosts(), vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(pool.size(), 4);
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn set_hosts_follows_topology() {
    setup_tracing();
    let cluster = SimulatedCluster::new();
    let pool = connect(&cluster).await;

    let hosts: Vec<Arc<HostInfo>> = ["10.0.0.3", "10.0.0.4"]
        .into_iter()
        .map(|peer| Arc::new(HostInfo::new(peer, 9042)))
        .collect();
    pool.set_hosts(&hosts).await;

    assert_eq!(pool.tracked_hosts(), vec!["10.0.0.3", "10.0.0.4"]);
    assert_eq!(pool.size(), 4);
    eventually(|| {
        cluster.live_connections_to("10.0.0.1:9042").is_empty()
            && cluster.live_connections_to("10.0.0.2:9042").is_empty()
    })
    .await;

    pool.host_down("10.0.0.4").await;
    assert_eq!(pool.tracked_hosts(), vec!["10.0.0.3"]);
    assert!(picked_addresses(&pool, 4)
        .iter()
        .all(|address| address == "10.0.0.3:9042"));
}
