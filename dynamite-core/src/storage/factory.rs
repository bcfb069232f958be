use super::{MemoryVersionStore, SqliteVersionStore, VersionStore};
use crate::{DynamiteError, Member, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Builds and initializes the version store for one node.
#[derive(Debug, Clone, Default)]
pub struct VersionStoreBuilder {
    backend: Option<StorageBackend>,
    data_dir: Option<PathBuf>,
    identity: Option<Member>,
}

impl VersionStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: StorageBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn identity(mut self, identity: Member) -> Self {
        self.identity = Some(identity);
        self
    }

    fn resolve_identity(&self) -> Result<Member> {
        let identity = self.identity.clone().ok_or_else(|| {
            DynamiteError::Config("storage requires the node identity".to_string())
        })?;
        if identity.as_str().trim().is_empty() {
            return Err(DynamiteError::Config(
                "node identity cannot be empty".to_string(),
            ));
        }

        Ok(identity)
    }

    fn resolve_data_dir(&self) -> Result<PathBuf> {
        let data_dir = self.data_dir.clone().ok_or_else(|| {
            DynamiteError::Config("data_dir is required for sqlite backend".to_string())
        })?;
        if data_dir.as_os_str().is_empty() {
            return Err(DynamiteError::Config(
                "data_dir cannot be empty for sqlite backend".to_string(),
            ));
        }

        Ok(data_dir)
    }

    /// Build the store and run its `init`.
    pub async fn build(&self) -> Result<Arc<dyn VersionStore>> {
        let store: Arc<dyn VersionStore> = match self.backend.unwrap_or_default() {
            StorageBackend::Sqlite => {
                let identity = self.resolve_identity()?;
                let data_dir = self.resolve_data_dir()?;
                let store = SqliteVersionStore::for_member(&data_dir, &identity);
                tracing::info!("Node {} stores versions in {}", identity, store.location());
                Arc::new(store)
            }
            StorageBackend::Memory => {
                tracing::info!("Using in-memory version store");
                Arc::new(MemoryVersionStore::new())
            }
        };

        store.init().await?;
        Ok(store)
    }
}
