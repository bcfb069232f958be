//! Picking one value out of the versions stored for a key.

use crate::storage::VersionRecord;
use crate::{DynamiteError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The value a read returns after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
    pub sequence_id: i64,
    /// How many versions were considered.
    pub candidates: usize,
}

/// A conflict resolution policy.
pub trait Reconciler: Send + Sync {
    fn resolve(&self, key: &str, versions: &[VersionRecord]) -> Result<ResolvedValue>;
}

/// Last write wins: greatest timestamp, ties broken by greatest sequence id.
///
/// Concurrent writes that lose are dropped silently.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl Reconciler for LastWriteWins {
    fn resolve(&self, key: &str, versions: &[VersionRecord]) -> Result<ResolvedValue> {
        resolve(key, versions)
    }
}

pub fn resolve(key: &str, versions: &[VersionRecord]) -> Result<ResolvedValue> {
    let winner = versions
        .iter()
        .max_by_key(|record| (record.timestamp, record.sequence_id))
        .ok_or_else(|| DynamiteError::NoVersions(key.to_string()))?;

    Ok(ResolvedValue {
        value: winner.value.clone(),
        timestamp: winner.timestamp,
        sequence_id: winner.sequence_id,
        candidates: versions.len(),
    })
}
