use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cql_pool::errors::ConnectionError;
use cql_pool::network::{
    Connection, ConnectionConfig, ConnectionErrorHandler, Connector, VerifiedKeyspaceName,
};

pub(crate) fn setup_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(tracing_subscriber::fmt::TestWriter::new())
        .try_init();
}

pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition was not met in time")
}

/// A cluster living in memory: nodes can be stopped and started, and every
/// connection to a stopped node breaks.
#[derive(Debug, Default)]
pub(crate) struct SimulatedCluster {
    stopped: Mutex<HashSet<String>>,
    connections: Mutex<Vec<Arc<SimulatedConnection>>>,
}

impl SimulatedCluster {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::clone(self) as Arc<dyn Connector>
    }

    /// Stops the node at `address` and breaks every connection to it.
    pub(crate) fn stop(&self, address: &str) {
        self.stopped.lock().unwrap().insert(address.to_owned());
        for conn in self.live_connections_to(address) {
            conn.kill();
        }
    }

    pub(crate) fn start(&self, address: &str) {
        self.stopped.lock().unwrap().remove(address);
    }

    pub(crate) fn live_connections_to(&self, address: &str) -> Vec<Arc<SimulatedConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|conn| conn.address == address && conn.is_alive())
            .cloned()
            .collect()
    }

    pub(crate) fn live_connections(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|conn| conn.is_alive())
            .count()
    }
}

#[async_trait]
impl Connector for SimulatedCluster {
    async fn connect(
        &self,
        address: &str,
        _config: &ConnectionConfig,
        error_handler: Arc<dyn ConnectionErrorHandler>,
    ) -> Result<Arc<dyn Connection>, ConnectionError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if self.stopped.lock().unwrap().contains(address) {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }

        let conn = Arc::new(SimulatedConnection {
            address: address.to_owned(),
            alive: AtomicBool::new(true),
            error_handler,
        });
        self.connections.lock().unwrap().push(Arc::clone(&conn));
        Ok(conn)
    }
}

pub(crate) struct SimulatedConnection {
    address: String,
    alive: AtomicBool,
    error_handler: Arc<dyn ConnectionErrorHandler>,
}

impl std::fmt::Debug for SimulatedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedConnection")
            .field("address", &self.address)
            .field("alive", &self.alive)
            .finish_non_exhaustive()
    }
}

impl SimulatedConnection {
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn kill(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            let error = ConnectionError::BrokenConnection("node stopped".to_owned());
            self.error_handler.handle_error(self, &error, true);
        }
    }
}

#[async_trait]
impl Connection for SimulatedConnection {
    fn connect_address(&self) -> &str {
        &self.address
    }

    async fn use_keyspace(&self, _keyspace: &VerifiedKeyspaceName) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}
