//! Dynamite Core - a small Dynamo-style partitioned key-value store
//!
//! - MD5 consistent-hash ring with virtual nodes decides which single node
//!   owns a key
//! - storage nodes serve only the keys they own and keep every write as a
//!   separate version
//! - reads reconcile versions with last-write-wins
//! - a load balancer routes client requests to the owning node

pub mod error;
pub mod operations;
pub mod reconcile;
pub mod ring;
pub mod storage;
pub mod transport;

pub use error::{DynamiteError, Result};
pub use operations::{
    DEFAULT_REQUEST_TIMEOUT, GetOutcome, LoadBalancer, PutOutcome, PutStatus, StorageNode,
};
pub use reconcile::{LastWriteWins, Reconciler, ResolvedValue, resolve};
pub use ring::{
    ClusterView, DEFAULT_REPLICAS, HashRing, Member, RingConfig, Token, TokenStrategy, hash_token,
};
pub use storage::{
    MemoryVersionStore, SqliteVersionStore, StorageBackend, VersionRecord, VersionStore,
    VersionStoreBuilder,
};
pub use transport::{HttpNodeClient, LocalNodeClient, NodeClient, RemoteGet, RemotePut};
