use super::{NodeClient, RemoteGet, RemotePut};
use crate::operations::{GetOutcome, PutOutcome, StorageNode};
use crate::{Member, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Calls a storage node living in the same process.
pub struct LocalNodeClient {
    node: Arc<StorageNode>,
}

impl LocalNodeClient {
    pub fn new(node: Arc<StorageNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl NodeClient for LocalNodeClient {
    fn member(&self) -> &Member {
        self.node.identity()
    }

    async fn get(&self, key: &str) -> Result<RemoteGet> {
        Ok(match self.node.get(key).await? {
            GetOutcome::Found(resolved) => RemoteGet::Found(resolved.value),
            GetOutcome::NotFound => RemoteGet::NotFound,
            GetOutcome::NotOwner { owner } => RemoteGet::NotOwner(Some(owner)),
        })
    }

    async fn put(&self, key: &str, value: Bytes, context: Option<&str>) -> Result<RemotePut> {
        Ok(match self.node.put(key, value, context).await? {
            PutOutcome::Accepted { .. } => RemotePut::Accepted,
            PutOutcome::Rejected { reason } => RemotePut::Rejected(reason),
            PutOutcome::NotOwner { owner } => RemotePut::NotOwner(Some(owner)),
        })
    }
}
