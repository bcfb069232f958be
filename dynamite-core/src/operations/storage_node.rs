use crate::reconcile::{LastWriteWins, Reconciler, ResolvedValue};
use crate::storage::VersionStore;
use crate::{ClusterView, DynamiteError, Member, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Found(ResolvedValue),
    NotFound,
    NotOwner { owner: Member },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Accepted {
        sequence_id: i64,
        timestamp: DateTime<Utc>,
    },
    /// The local store failed the write.
    Rejected { reason: String },
    NotOwner { owner: Member },
}

/// Serves the keys the ring assigns to `identity` and refuses the rest.
///
/// Ownership is checked against the current ring snapshot on every call; a
/// node never forwards a request it does not own.
pub struct StorageNode {
    identity: Member,
    view: Arc<ClusterView>,
    store: Arc<dyn VersionStore>,
    reconciler: Arc<dyn Reconciler>,
    /// Held while stamping and appending, so timestamps follow sequence ids.
    append_lock: Mutex<()>,
}

impl StorageNode {
    pub fn new(identity: Member, view: Arc<ClusterView>, store: Arc<dyn VersionStore>) -> Result<Self> {
        if !view.snapshot().contains(&identity) {
            return Err(DynamiteError::Config(format!(
                "node {} is not a member of its own cluster view",
                identity
            )));
        }

        Ok(Self {
            identity,
            view,
            store,
            reconciler: Arc::new(LastWriteWins),
            append_lock: Mutex::new(()),
        })
    }

    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn identity(&self) -> &Member {
        &self.identity
    }

    pub fn view(&self) -> &Arc<ClusterView> {
        &self.view
    }

    /// `Some(owner)` when the key belongs to another member.
    fn foreign_owner(&self, key: &str) -> Result<Option<Member>> {
        let owner = self.view.owner_of(key)?;
        if owner == self.identity {
            Ok(None)
        } else {
            tracing::info!(
                "Not responsible for key={} (owner={} self={})",
                key,
                owner,
                self.identity
            );
            Ok(Some(owner))
        }
    }

    /// Read and reconcile a key. A failed read is an error, not `NotFound`.
    pub async fn get(&self, key: &str) -> Result<GetOutcome> {
        tracing::debug!("Getting key={}", key);

        if let Some(owner) = self.foreign_owner(key)? {
            return Ok(GetOutcome::NotOwner { owner });
        }

        let versions = self.store.read_versions(key).await?;
        if versions.is_empty() {
            return Ok(GetOutcome::NotFound);
        }

        let resolved = self.reconciler.resolve(key, &versions)?;
        tracing::debug!(
            "Resolved key={} to sequence_id={} from {} versions",
            key,
            resolved.sequence_id,
            resolved.candidates
        );
        Ok(GetOutcome::Found(resolved))
    }

    /// Append a new version of a key. `context` is reserved and ignored.
    pub async fn put(&self, key: &str, value: Bytes, context: Option<&str>) -> Result<PutOutcome> {
        if let Some(context) = context {
            tracing::debug!("Ignoring put context for key={}: {}", key, context);
        }

        if let Some(owner) = self.foreign_owner(key)? {
            return Ok(PutOutcome::NotOwner { owner });
        }

        let _guard = self.append_lock.lock().await;
        let timestamp = Utc::now();
        match self.store.append_version(key, value, timestamp).await {
            Ok(sequence_id) => {
                tracing::debug!("Stored key={} sequence_id={}", key, sequence_id);
                Ok(PutOutcome::Accepted {
                    sequence_id,
                    timestamp,
                })
            }
            Err(error) => {
                tracing::error!(
                    "Error putting key={} into the persistence layer: {}",
                    key,
                    error
                );
                Ok(PutOutcome::Rejected {
                    reason: error.to_string(),
                })
            }
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RingConfig;
    use crate::storage::{MemoryVersionStore, SqliteVersionStore, VersionRecord};
    use async_trait::async_trait;

    async fn single_node() -> StorageNode {
        let me = Member::from("127.0.0.1:1111");
        let view = Arc::new(ClusterView::for_node(&[], &me, RingConfig::default()).unwrap());
        let store = Arc::new(SqliteVersionStore::in_memory());
        store.init().await.unwrap();
        StorageNode::new(me, view, store).unwrap()
    }

    #[tokio::test]
    async fn test_simple_put() {
        let node = single_node().await;
        let outcome = node.put("foo", Bytes::from("bar"), None).await.unwrap();
        assert!(matches!(outcome, PutOutcome::Accepted { sequence_id: 1, .. }));
    }

    #[tokio::test]
    async fn test_simple_get() {
        let node = single_node().await;
        node.put("foo", Bytes::from("bar"), None).await.unwrap();

        match node.get("foo").await.unwrap() {
            GetOutcome::Found(resolved) => assert_eq!(resolved.value, Bytes::from("bar")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_date_reconcile() {
        let node = single_node().await;
        for value in ["bar", "bar2", "bar3"] {
            let outcome = node.put("foo", Bytes::from(value), None).await.unwrap();
            assert!(matches!(outcome, PutOutcome::Accepted { .. }));
        }

        match node.get("foo").await.unwrap() {
            GetOutcome::Found(resolved) => {
                assert_eq!(resolved.value, Bytes::from("bar3"));
                assert_eq!(resolved.candidates, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let node = single_node().await;
        assert_eq!(node.get("nope").await.unwrap(), GetOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_context_is_accepted() {
        let node = single_node().await;
        let outcome = node
            .put("foo", Bytes::from("bar"), Some("opaque"))
            .await
            .unwrap();
        assert!(matches!(outcome, PutOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_foreign_keys_are_refused() {
        let me = Member::from("10.0.0.1:25000");
        let other = Member::from("10.0.0.2:25000");
        let view = Arc::new(
            ClusterView::for_node(&[other.clone()], &me, RingConfig::default()).unwrap(),
        );
        let node = StorageNode::new(me.clone(), view.clone(), Arc::new(MemoryVersionStore::new()))
            .unwrap();

        let key = (0..1000)
            .map(|i| format!("key-{}", i))
            .find(|key| view.owner_of(key).unwrap() == other)
            .unwrap();

        assert_eq!(
            node.get(&key).await.unwrap(),
            GetOutcome::NotOwner {
                owner: other.clone()
            }
        );
        assert_eq!(
            node.put(&key, Bytes::from("x"), None).await.unwrap(),
            PutOutcome::NotOwner { owner: other }
        );
    }

    #[tokio::test]
    async fn test_identity_must_be_on_ring() {
        let view = Arc::new(
            ClusterView::new(&[Member::from("10.0.0.2:25000")], RingConfig::default()).unwrap(),
        );
        let result = StorageNode::new(
            Member::from("10.0.0.1:25000"),
            view,
            Arc::new(MemoryVersionStore::new()),
        );
        assert!(matches!(result, Err(DynamiteError::Config(_))));
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_timestamps_in_sequence_order() {
        let me = Member::from("127.0.0.1:1111");
        let view = Arc::new(ClusterView::for_node(&[], &me, RingConfig::default()).unwrap());
        let store = Arc::new(MemoryVersionStore::new());
        let node = Arc::new(StorageNode::new(me, view, store.clone()).unwrap());

        let puts = (0..64).map(|i| {
            let node = node.clone();
            async move {
                node.put("hot", Bytes::from(format!("v{}", i)), None)
                    .await
                    .unwrap()
            }
        });
        futures_util::future::join_all(puts).await;

        let versions = store.read_versions("hot").await.unwrap();
        assert_eq!(versions.len(), 64);
        assert!(versions.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));

        match node.get("hot").await.unwrap() {
            GetOutcome::Found(resolved) => {
                assert_eq!(resolved.sequence_id, versions[63].sequence_id)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl VersionStore for BrokenStore {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn append_version(&self, _: &str, _: Bytes, _: DateTime<Utc>) -> Result<i64> {
            Err(DynamiteError::Storage("disk full".to_string()))
        }

        async fn read_versions(&self, _: &str) -> Result<Vec<VersionRecord>> {
            Err(DynamiteError::Storage("disk unreadable".to_string()))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_storage_faults_are_distinguished() {
        let me = Member::from("127.0.0.1:1111");
        let view = Arc::new(ClusterView::for_node(&[], &me, RingConfig::default()).unwrap());
        let node = StorageNode::new(me, view, Arc::new(BrokenStore)).unwrap();

        assert!(matches!(
            node.put("foo", Bytes::from("bar"), None).await.unwrap(),
            PutOutcome::Rejected { reason } if reason.contains("disk full")
        ));
        assert!(matches!(
            node.get("foo").await,
            Err(DynamiteError::Storage(_))
        ));
    }

    struct FirstWriteWins;

    impl Reconciler for FirstWriteWins {
        fn resolve(&self, key: &str, versions: &[VersionRecord]) -> Result<ResolvedValue> {
            let first = versions
                .iter()
                .min_by_key(|v| v.sequence_id)
                .ok_or_else(|| DynamiteError::NoVersions(key.to_string()))?;
            Ok(ResolvedValue {
                value: first.value.clone(),
                timestamp: first.timestamp,
                sequence_id: first.sequence_id,
                candidates: versions.len(),
            })
        }
    }

    #[tokio::test]
    async fn test_custom_reconciler() {
        let node = single_node().await.with_reconciler(Arc::new(FirstWriteWins));
        node.put("foo", Bytes::from("first"), None).await.unwrap();
        node.put("foo", Bytes::from("second"), None).await.unwrap();

        match node.get("foo").await.unwrap() {
            GetOutcome::Found(resolved) => assert_eq!(resolved.value, Bytes::from("first")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
