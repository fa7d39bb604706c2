//! Information that host selection policies use to route a request:
//! tokens, partitioners and the per-request [RoutingInfo].

pub mod partitioner;

pub use partitioner::PartitionerName;

/// Token is a result of computing a hash of a primary key
///
/// It is basically an i64 with one caveat: i64::MIN is not
/// a valid token. It is used to represent infinity.
/// For this reason tokens are normalized - i64::MIN
/// is replaced with i64::MAX.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub struct Token {
    value: i64,
}

impl Token {
    /// Creates a new token with given value, normalizing the value if necessary
    #[inline]
    pub fn new(value: i64) -> Self {
        Self {
            value: if value == i64::MIN { i64::MAX } else { value },
        }
    }

    /// Raw value of the token.
    #[inline]
    pub fn value(&self) -> i64 {
        self.value
    }
}

/// Represents info about a request that can be used by host selection policies.
///
/// The default value carries no routing information at all; token-aware
/// policies then fall back to their token-unaware behaviour.
#[derive(Default, Clone, Debug)]
pub struct RoutingInfo<'a> {
    /// Token of the partition the request targets, if the caller already computed it.
    pub token: Option<Token>,

    /// Serialized partition key. Hashed with the cluster's partitioner
    /// when `token` is not given.
    pub routing_key: Option<&'a [u8]>,

    /// Keyspace the request targets.
    pub keyspace: Option<&'a str>,
}

impl<'a> RoutingInfo<'a> {
    /// Routing info for a request with a known serialized partition key.
    pub fn with_routing_key(routing_key: &'a [u8]) -> Self {
        Self {
            routing_key: Some(routing_key),
            ..Default::default()
        }
    }

    /// Routing info for a request whose token is already known.
    pub fn with_token(token: Token) -> Self {
        Self {
            token: Some(token),
            ..Default::default()
        }
    }

    /// Computes the token of the request: the explicit one if present,
    /// otherwise the hash of the routing key under `partitioner`.
    pub fn compute_token(&self, partitioner: Option<&PartitionerName>) -> Option<Token> {
        self.token.or_else(|| {
            let key = self.routing_key?;
            Some(partitioner?.hash(key))
        })
    }
}
