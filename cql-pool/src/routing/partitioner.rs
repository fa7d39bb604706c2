//! Partitioners compute the token of a serialized partition key, which lets
//! token-aware policies route a request straight to a replica.
//!
//! Only `Murmur3Partitioner`, the default of both ScyllaDB and Cassandra, is supported.

use std::num::Wrapping;

use super::Token;

/// Partitioner used by the cluster, as announced by its metadata.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[non_exhaustive]
pub enum PartitionerName {
    /// `org.apache.cassandra.dht.Murmur3Partitioner`
    #[default]
    Murmur3,
}

impl PartitionerName {
    /// Parses the (possibly fully qualified) class name of a partitioner.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<Self> {
        if name.ends_with("Murmur3Partitioner") {
            Some(PartitionerName::Murmur3)
        } else {
            None
        }
    }

    /// Computes the token of a serialized partition key.
    pub fn hash(&self, key: &[u8]) -> Token {
        match self {
            PartitionerName::Murmur3 => murmur3_token(key),
        }
    }
}

const C1: Wrapping<i64> = Wrapping(0x87c3_7b91_1142_53d5_u64 as i64);
const C2: Wrapping<i64> = Wrapping(0x4cf5_ad43_2745_937f_u64 as i64);

#[inline]
fn rotl64(v: Wrapping<i64>, n: u32) -> Wrapping<i64> {
    Wrapping(v.0.rotate_left(n))
}

#[inline]
fn fmix(mut k: Wrapping<i64>) -> Wrapping<i64> {
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k *= Wrapping(0xff51_afd7_ed55_8ccd_u64 as i64);
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k *= Wrapping(0xc4ce_b9fe_1a85_ec53_u64 as i64);
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k
}

// Murmur3 x64_128 as implemented by Cassandra: the tail bytes are sign-extended
// and only the lower half of the 128-bit result becomes the token.
fn murmur3_token(key: &[u8]) -> Token {
    let mut h1 = Wrapping(0_i64);
    let mut h2 = Wrapping(0_i64);

    let mut blocks = key.chunks_exact(16);
    for block in &mut blocks {
        let (lo, hi) = block.split_at(8);
        let mut k1 = Wrapping(i64::from_le_bytes(lo.try_into().unwrap_or_default()));
        let mut k2 = Wrapping(i64::from_le_bytes(hi.try_into().unwrap_or_default()));

        k1 *= C1;
        k1 = rotl64(k1, 31);
        k1 *= C2;
        h1 ^= k1;

        h1 = rotl64(h1, 27);
        h1 += h2;
        h1 = h1 * Wrapping(5) + Wrapping(0x52dc_e729);

        k2 *= C2;
        k2 = rotl64(k2, 33);
        k2 *= C1;
        h2 ^= k2;

        h2 = rotl64(h2, 31);
        h2 += h1;
        h2 = h2 * Wrapping(5) + Wrapping(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    let mut k1 = Wrapping(0_i64);
    let mut k2 = Wrapping(0_i64);

    if tail.len() > 8 {
        for i in (8..tail.len()).rev() {
            k2 ^= Wrapping(tail[i] as i8 as i64) << ((i - 8) * 8);
        }
        k2 *= C2;
        k2 = rotl64(k2, 33);
        k2 *= C1;
        h2 ^= k2;
    }

    if !tail.is_empty() {
        for i in (0..tail.len().min(8)).rev() {
            k1 ^= Wrapping(tail[i] as i8 as i64) << (i * 8);
        }
        k1 *= C1;
        k1 = rotl64(k1, 31);
        k1 *= C2;
        h1 ^= k1;
    }

    h1 ^= Wrapping(key.len() as i64);
    h2 ^= Wrapping(key.len() as i64);

    h1 += h2;
    h2 += h1;

    h1 = fmix(h1);
    h2 = fmix(h2);

    h1 += h2;

    Token::new(h1.0)
}
