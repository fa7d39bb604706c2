//! Errors returned by the pool and by its collaborators.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// An error that appeared on a connection level.
///
/// It is produced by [Connector](crate::network::Connector) implementations when
/// a connection cannot be opened or set up, and handed to
/// [ConnectionErrorHandler](crate::network::ConnectionErrorHandler) when an
/// established connection fails.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConnectionError {
    /// Opening the connection (or setting it up) did not finish within the connect timeout.
    #[error("Connect timeout elapsed")]
    ConnectTimeout,

    /// Input/Output error has occurred.
    #[error(transparent)]
    IoError(Arc<std::io::Error>),

    /// An established connection became unusable.
    #[error("Connection broken: {0}")]
    BrokenConnection(String),

    /// Selecting the pool's keyspace on a fresh connection failed.
    #[error(transparent)]
    UseKeyspace(#[from] UseKeyspaceError),

    /// The connector failed to perform its own setup (handshake, TLS, authentication).
    #[error("Connection setup failed: {0}")]
    SetupFailed(String),
}

impl From<std::io::Error> for ConnectionError {
    fn from(value: std::io::Error) -> Self {
        ConnectionError::IoError(Arc::new(value))
    }
}

impl ConnectionError {
    /// Returns true for failures that are routine while a node is down
    /// (refused or reset dials, timeouts). The pool does not log those loudly.
    pub fn is_expected_during_outage(&self) -> bool {
        match self {
            ConnectionError::ConnectTimeout => true,
            ConnectionError::IoError(err) => matches!(
                err.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Error that occurred while selecting a keyspace on a connection.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum UseKeyspaceError {
    /// Passed invalid keyspace name to use
    #[error("Passed invalid keyspace name to use: {0}")]
    BadKeyspaceName(#[from] BadKeyspaceName),

    /// The node did not answer in time.
    #[error("Request timeout: {0:?}")]
    RequestTimeout(Duration),

    /// The node refused to switch to the keyspace.
    #[error("Keyspace change rejected: {0}")]
    Rejected(String),
}

/// Invalid keyspace name given to `use_keyspace()`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BadKeyspaceName {
    /// Keyspace name is empty
    #[error("Keyspace name is empty")]
    Empty,

    /// Keyspace name too long, must be up to 48 characters
    #[error("Keyspace name too long, must be up to 48 characters, found {1} characters. Bad keyspace name: '{0}'")]
    TooLong(String, usize),

    /// Illegal character - only alphanumeric and underscores allowed.
    #[error("Illegal character found: '{1}', only alphanumeric and underscores allowed. Bad keyspace name: '{0}'")]
    IllegalCharacter(String, char),
}

/// Error that occurred while creating a [PolicyConnectionPool](crate::cluster::PolicyConnectionPool).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum NewPoolError {
    /// List of known nodes passed to the builder is empty.
    /// There needs to be at least one node to connect to
    #[error("Empty known nodes list")]
    EmptyKnownNodesList,

    /// The configured keyspace name is invalid.
    #[error(transparent)]
    BadKeyspaceName(#[from] BadKeyspaceName),

    /// None of the known nodes accepted a connection.
    #[error("Could not connect to any of the known nodes")]
    NoReachableKnownNode,
}
