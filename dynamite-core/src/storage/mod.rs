//! Storage modules for Dynamite
//!
//! Every write is appended as a new version of its key; nothing is updated in
//! place. Backends implement [`VersionStore`] and are chosen at construction.

pub mod factory;
pub mod memory_store;
pub mod sqlite_store;

pub use factory::{StorageBackend, VersionStoreBuilder};
pub use memory_store::MemoryVersionStore;
pub use sqlite_store::SqliteVersionStore;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored write for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub sequence_id: i64,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl VersionRecord {
    pub fn new(sequence_id: i64, value: impl Into<Bytes>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sequence_id,
            value: value.into(),
            timestamp,
        }
    }
}

/// Append-only per-key version store owned by a single node.
///
/// Appends must be linearizable: a later `append_version` always gets a
/// larger `sequence_id` than an earlier one.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Prepare the store for use. Safe to call more than once.
    async fn init(&self) -> Result<()>;

    /// Store a new version and return its sequence id.
    async fn append_version(&self, key: &str, value: Bytes, timestamp: DateTime<Utc>)
    -> Result<i64>;

    /// All versions of `key` in sequence order; empty if the key is unknown.
    async fn read_versions(&self, key: &str) -> Result<Vec<VersionRecord>>;

    async fn close(&self) -> Result<()>;
}
