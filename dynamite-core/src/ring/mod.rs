//! Consistent-hashing ring and the cluster view built on top of it.
//!
//! Keys and virtual-node tokens share one 128-bit MD5 keyspace. A key is owned
//! by the member holding the first token at or after the key's hash, wrapping
//! around past the largest token.

pub mod cluster_view;
pub mod hash_ring;

pub use cluster_view::{ClusterView, DEFAULT_REPLICAS, RingConfig};
pub use hash_ring::{HashRing, Token, TokenStrategy, hash_token};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant on the ring, identified by its `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Member(String);

impl Member {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Member {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Member {
    fn from(address: String) -> Self {
        Self(address)
    }
}
