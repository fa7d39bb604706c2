use std::fmt::Display;
use std::net::IpAddr;

use uuid::Uuid;

use crate::routing::Token;

/// Availability of a host as reported by the cluster membership layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostState {
    /// The host is believed to accept connections.
    #[default]
    Up,
    /// The host is known to be unavailable.
    Down,
}

/// HostInfo represents a cluster node as seen by the topology layer.
///
/// It is an immutable snapshot: topology events deliver a fresh `HostInfo`
/// instead of mutating the old one. The pool keys its per-host pools by
/// [peer](HostInfo::peer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    peer: String,
    port: u16,
    state: HostState,
    host_id: Option<Uuid>,
    datacenter: Option<String>,
    rack: Option<String>,
    tokens: Vec<Token>,
}

impl HostInfo {
    /// Creates an `Up` host with no metadata besides its address.
    pub fn new(peer: impl Into<String>, port: u16) -> Self {
        Self {
            peer: peer.into(),
            port,
            state: HostState::Up,
            host_id: None,
            datacenter: None,
            rack: None,
            tokens: Vec::new(),
        }
    }

    /// Sets the availability of the host.
    pub fn with_state(mut self, state: HostState) -> Self {
        self.state = state;
        self
    }

    /// Sets the unique identifier of the host.
    pub fn with_host_id(mut self, host_id: Uuid) -> Self {
        self.host_id = Some(host_id);
        self
    }

    /// Sets the datacenter and rack of the host.
    pub fn with_location(
        mut self,
        datacenter: impl Into<String>,
        rack: Option<impl Into<String>>,
    ) -> Self {
        self.datacenter = Some(datacenter.into());
        self.rack = rack.map(Into::into);
        self
    }

    /// Sets the tokens owned by the host on the ring.
    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = Token>) -> Self {
        self.tokens = tokens.into_iter().collect();
        self
    }

    /// Address of the host, without the port.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Port the host listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Availability of the host.
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Returns true if the host is reported as up.
    pub fn is_up(&self) -> bool {
        self.state == HostState::Up
    }

    /// Unique identifier of the host, if known.
    pub fn host_id(&self) -> Option<Uuid> {
        self.host_id
    }

    /// Datacenter of the host, if known.
    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    /// Rack of the host, if known.
    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }

    /// Tokens owned by the host.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// `host:port` string suitable for dialing the host on `port`.
    pub fn connect_address(&self, port: u16) -> String {
        join_host_port(&self.peer, port)
    }
}

impl Display for HostInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", join_host_port(&self.peer, self.port))?;
        if self.state == HostState::Down {
            write!(f, " (down)")?;
        }
        Ok(())
    }
}

// IPv6 literals need brackets so that the port separator stays unambiguous.
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{host}]:{port}"),
        _ => format!("{host}:{port}"),
    }
}
