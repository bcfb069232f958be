//! How the load balancer reaches storage nodes.
//!
//! The wire format is plain HTTP: `GET /kv/{key}` and `PUT /kv/{key}` with the
//! raw value as body. A node that does not own the key answers
//! `421 Misdirected Request` and names the owner it computed in
//! [`OWNER_HEADER`]. The empty key travels as `/kv/`.

pub mod http;
pub mod local;

pub use http::HttpNodeClient;
pub use local::LocalNodeClient;

use crate::{Member, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Route prefix for key operations.
pub const KV_PREFIX: &str = "kv";

/// Response header carrying the owner a node computed for a misrouted key.
pub const OWNER_HEADER: &str = "x-dynamite-owner";

/// Set on a node's `404` when the key has no versions. A `404` without it
/// came from somewhere other than the key handler.
pub const MISSING_HEADER: &str = "x-dynamite-missing";

/// Answer to a remote `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteGet {
    Found(Bytes),
    NotFound,
    NotOwner(Option<Member>),
}

/// Answer to a remote `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemotePut {
    Accepted,
    Rejected(String),
    NotOwner(Option<Member>),
}

/// A handle to one storage node.
///
/// `Err` means the call itself failed (connection, timeout, unexpected
/// response); everything the node decided is in the `Ok` value.
#[async_trait]
pub trait NodeClient: Send + Sync {
    fn member(&self) -> &Member;

    async fn get(&self, key: &str) -> Result<RemoteGet>;

    async fn put(&self, key: &str, value: Bytes, context: Option<&str>) -> Result<RemotePut>;
}
