use super::{VersionRecord, VersionStore};
use crate::{DynamiteError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    versions: HashMap<String, Vec<VersionRecord>>,
    closed: bool,
}

/// Process-local version store, used for tests and throwaway nodes.
#[derive(Default)]
pub struct MemoryVersionStore {
    state: Mutex<MemoryState>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn init(&self) -> Result<()> {
        self.state.lock().await.closed = false;
        Ok(())
    }

    async fn append_version(
        &self,
        key: &str,
        value: Bytes,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DynamiteError::Storage("memory store is closed".to_string()));
        }

        state.last_id += 1;
        let sequence_id = state.last_id;
        state
            .versions
            .entry(key.to_string())
            .or_default()
            .push(VersionRecord::new(sequence_id, value, timestamp));
        Ok(sequence_id)
    }

    async fn read_versions(&self, key: &str) -> Result<Vec<VersionRecord>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(DynamiteError::Storage("memory store is closed".to_string()));
        }
        Ok(state.versions.get(key).cloned().unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.versions.clear();
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_append_and_read() {
        let store = MemoryVersionStore::new();
        let now = Utc::now();

        assert_eq!(store.append_version("foo", Bytes::from("a"), now).await.unwrap(), 1);
        assert_eq!(store.append_version("foo", Bytes::from("b"), now).await.unwrap(), 2);

        let values: Vec<Bytes> = store
            .read_versions("foo")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(values, vec![Bytes::from("a"), Bytes::from("b")]);
        assert!(store.read_versions("bar").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_unique_ids() {
        let store = Arc::new(MemoryVersionStore::new());

        let writes = (0..32).map(|i| {
            let store = store.clone();
            async move {
                store
                    .append_version("hot", Bytes::from(format!("v{}", i)), Utc::now())
                    .await
                    .unwrap()
            }
        });
        let mut ids = join_all(writes).await;
        ids.sort_unstable();

        assert_eq!(ids, (1..=32).collect::<Vec<i64>>());
        assert_eq!(store.read_versions("hot").await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_closed_store_fails() {
        let store = MemoryVersionStore::new();
        store.append_version("foo", Bytes::from("a"), Utc::now()).await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(
            store.read_versions("foo").await,
            Err(DynamiteError::Storage(_))
        ));

        store.init().await.unwrap();
        assert!(store.read_versions("foo").await.unwrap().is_empty());
    }
}
