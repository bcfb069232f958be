use crate::transport::{HttpNodeClient, NodeClient, RemoteGet, RemotePut};
use crate::{ClusterView, DynamiteError, Member, Result, RingConfig};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a routed `put`, in the status codes clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Stored,
    Failed,
    /// The owner refused the key: the balancer's ring disagrees with the node's.
    Misrouted,
}

impl PutStatus {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Stored => Some("200"),
            Self::Failed => Some("400"),
            Self::Misrouted => None,
        }
    }
}

/// Routes each request to the member the ring assigns and relays its answer.
///
/// Ownership is exclusive, so a failed call is reported to the client and
/// never retried against another member.
pub struct LoadBalancer {
    view: Arc<ClusterView>,
    clients: HashMap<Member, Arc<dyn NodeClient>>,
    request_timeout: Duration,
}

impl LoadBalancer {
    pub fn new(view: Arc<ClusterView>, clients: Vec<Arc<dyn NodeClient>>) -> Result<Self> {
        let clients: HashMap<Member, Arc<dyn NodeClient>> = clients
            .into_iter()
            .map(|client| (client.member().clone(), client))
            .collect();

        for member in view.members() {
            if !clients.contains_key(&member) {
                return Err(DynamiteError::Config(format!(
                    "no connection configured for member {}",
                    member
                )));
            }
        }

        Ok(Self {
            view,
            clients,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Build a balancer talking HTTP to every member.
    pub fn connect(members: &[Member], config: RingConfig, request_timeout: Duration) -> Result<Self> {
        if members.is_empty() {
            return Err(DynamiteError::EmptyRing(
                "cannot have empty server list".to_string(),
            ));
        }

        let view = Arc::new(ClusterView::new(members, config)?);
        let clients = members
            .iter()
            .map(|member| {
                HttpNodeClient::new(member.clone(), request_timeout)
                    .map(|client| Arc::new(client) as Arc<dyn NodeClient>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(view, clients)?.with_request_timeout(request_timeout))
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn view(&self) -> &Arc<ClusterView> {
        &self.view
    }

    fn route(&self, key: &str) -> Result<Arc<dyn NodeClient>> {
        let owner = self.view.owner_of(key)?;
        self.clients
            .get(&owner)
            .cloned()
            .ok_or_else(|| DynamiteError::Internal(format!("no connection to member {}", owner)))
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| {
                DynamiteError::Http(format!("request timed out after {:?}", self.request_timeout))
            })?
    }

    /// Fetch a key from its owner. `None` covers a missing key and any failure.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let client = match self.route(key) {
            Ok(client) => client,
            Err(error) => {
                tracing::error!("Error routing get for key={}: {}", key, error);
                return None;
            }
        };
        tracing::debug!("Getting key={} from node={}", key, client.member());

        match self.bounded(client.get(key)).await {
            Ok(RemoteGet::Found(value)) => Some(value),
            Ok(RemoteGet::NotFound) => None,
            Ok(RemoteGet::NotOwner(owner)) => {
                tracing::error!(
                    "Ring mismatch: node={} refused key={} (it computed owner={:?})",
                    client.member(),
                    key,
                    owner
                );
                None
            }
            Err(error) => {
                tracing::error!(
                    "Error getting key={} from node={}: {}",
                    key,
                    client.member(),
                    error
                );
                None
            }
        }
    }

    /// Store a key on its owner.
    pub async fn put(&self, key: &str, value: Bytes, context: Option<&str>) -> PutStatus {
        let client = match self.route(key) {
            Ok(client) => client,
            Err(error) => {
                tracing::error!("Error routing put for key={}: {}", key, error);
                return PutStatus::Failed;
            }
        };
        tracing::debug!("Putting key={} on node={}", key, client.member());

        match self.bounded(client.put(key, value, context)).await {
            Ok(RemotePut::Accepted) => PutStatus::Stored,
            Ok(RemotePut::Rejected(reason)) => {
                tracing::warn!(
                    "Node {} rejected key={}: {}",
                    client.member(),
                    key,
                    reason
                );
                PutStatus::Failed
            }
            Ok(RemotePut::NotOwner(owner)) => {
                tracing::error!(
                    "Ring mismatch: node={} refused key={} (it computed owner={:?})",
                    client.member(),
                    key,
                    owner
                );
                PutStatus::Misrouted
            }
            Err(error) => {
                tracing::error!(
                    "Error putting key={} on node={}: {}",
                    key,
                    client.member(),
                    error
                );
                PutStatus::Failed
            }
        }
    }
}
