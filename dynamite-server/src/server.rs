use crate::config::{Config, DEFAULT_BALANCER_PORT, DEFAULT_NODE_PORT};
use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use dynamite_core::{
    ClusterView, GetOutcome, LoadBalancer, Member, PutOutcome, PutStatus, Result, StorageNode,
    VersionStoreBuilder,
    transport::{MISSING_HEADER, OWNER_HEADER},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Debug, Deserialize)]
struct PutKeyQuery {
    #[serde(default)]
    context: Option<String>,
}

/// Body of every `PUT` answer. `status` is the code string clients key off.
#[derive(Debug, Serialize)]
struct PutResponse {
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl PutResponse {
    fn status(status: Option<&'static str>) -> Self {
        Self {
            status,
            sequence_id: None,
            timestamp: None,
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_owner(owner: &Member) -> Response {
    (
        StatusCode::MISDIRECTED_REQUEST,
        [(OWNER_HEADER, owner.to_string())],
        axum::Json(ErrorResponse {
            error: format!("key is owned by {}", owner),
        }),
    )
        .into_response()
}

pub fn node_router(node: Arc<StorageNode>) -> Router {
    Router::new()
        .route("/health", get(node_health))
        .route("/kv/", get(node_get_empty).put(node_put_empty))
        .route("/kv/*key", get(node_get).put(node_put))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

pub fn balancer_router(balancer: Arc<LoadBalancer>) -> Router {
    Router::new()
        .route("/health", get(balancer_health))
        .route("/kv/", get(balancer_get_empty).put(balancer_put_empty))
        .route("/kv/*key", get(balancer_get).put(balancer_put))
        .layer(TraceLayer::new_for_http())
        .with_state(balancer)
}

pub async fn run_node_server(config: Config) -> Result<()> {
    let identity = config.node_identity(DEFAULT_NODE_PORT)?;
    let members = config.member_list()?;
    let view = Arc::new(ClusterView::for_node(&members, &identity, config.ring_config()?)?);

    let store = VersionStoreBuilder::new()
        .backend(config.storage.backend)
        .data_dir(config.storage.data_dir.clone())
        .identity(identity.clone())
        .build()
        .await?;

    let node = Arc::new(StorageNode::new(identity.clone(), view.clone(), store)?);
    tracing::info!(
        "Node {} serving a ring of {} members",
        identity,
        view.members().len()
    );

    let bind_addr = config.bind_socket_addr(DEFAULT_NODE_PORT)?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Storage node listening on {}", bind_addr);

    axum::serve(listener, node_router(node.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    node.close().await?;
    tracing::info!("Node {} stopped", identity);
    Ok(())
}

pub async fn run_balancer_server(config: Config) -> Result<()> {
    let members = config.member_list()?;
    let balancer = Arc::new(LoadBalancer::connect(
        &members,
        config.ring_config()?,
        config.request_timeout(),
    )?);
    tracing::info!("Balancing over members: {:?}", balancer.view().members());

    let bind_addr = config.bind_socket_addr(DEFAULT_BALANCER_PORT)?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Load balancer listening on {}", bind_addr);

    axum::serve(listener, balancer_router(balancer))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn node_health(State(node): State<Arc<StorageNode>>) -> impl IntoResponse {
    let ring = node.view().snapshot();
    let response = serde_json::json!({
        "node": node.identity(),
        "members": ring.members(),
        "tokens": ring.size(),
        "replicas": node.view().config().replicas,
    });

    (StatusCode::OK, axum::Json(response))
}

async fn node_get(State(node): State<Arc<StorageNode>>, Path(key): Path<String>) -> Response {
    get_from_node(&node, &key).await
}

// The wildcard route never matches `/kv/`, which is where the empty key lands.
async fn node_get_empty(State(node): State<Arc<StorageNode>>) -> Response {
    get_from_node(&node, "").await
}

async fn get_from_node(node: &StorageNode, key: &str) -> Response {
    match node.get(key).await {
        Ok(GetOutcome::Found(resolved)) => (StatusCode::OK, resolved.value).into_response(),
        Ok(GetOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, [(MISSING_HEADER, "1")]).into_response()
        }
        Ok(GetOutcome::NotOwner { owner }) => not_owner(&owner),
        Err(error) => {
            tracing::error!("Error getting key={}: {}", key, error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn node_put(
    State(node): State<Arc<StorageNode>>,
    Path(key): Path<String>,
    Query(query): Query<PutKeyQuery>,
    body: Bytes,
) -> Response {
    put_on_node(&node, &key, query, body).await
}

async fn node_put_empty(
    State(node): State<Arc<StorageNode>>,
    Query(query): Query<PutKeyQuery>,
    body: Bytes,
) -> Response {
    put_on_node(&node, "", query, body).await
}

async fn put_on_node(node: &StorageNode, key: &str, query: PutKeyQuery, body: Bytes) -> Response {
    match node.put(key, body, query.context.as_deref()).await {
        Ok(PutOutcome::Accepted {
            sequence_id,
            timestamp,
        }) => {
            let response = PutResponse {
                sequence_id: Some(sequence_id),
                timestamp: Some(timestamp.to_rfc3339()),
                ..PutResponse::status(PutStatus::Stored.code())
            };
            (StatusCode::OK, axum::Json(response)).into_response()
        }
        Ok(PutOutcome::Rejected { reason }) => {
            let response = PutResponse {
                error: Some(reason),
                ..PutResponse::status(PutStatus::Failed.code())
            };
            (StatusCode::BAD_REQUEST, axum::Json(response)).into_response()
        }
        Ok(PutOutcome::NotOwner { owner }) => not_owner(&owner),
        Err(error) => {
            tracing::error!("Error putting key={}: {}", key, error);
            let response = PutResponse {
                error: Some(error.to_string()),
                ..PutResponse::status(PutStatus::Failed.code())
            };
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(response)).into_response()
        }
    }
}

async fn balancer_health(State(balancer): State<Arc<LoadBalancer>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "members": balancer.view().members(),
    });

    (StatusCode::OK, axum::Json(response))
}

async fn balancer_get(
    State(balancer): State<Arc<LoadBalancer>>,
    Path(key): Path<String>,
) -> Response {
    get_via_balancer(&balancer, &key).await
}

async fn balancer_get_empty(State(balancer): State<Arc<LoadBalancer>>) -> Response {
    get_via_balancer(&balancer, "").await
}

async fn get_via_balancer(balancer: &LoadBalancer, key: &str) -> Response {
    match balancer.get(key).await {
        Some(value) => (StatusCode::OK, value).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn balancer_put(
    State(balancer): State<Arc<LoadBalancer>>,
    Path(key): Path<String>,
    Query(query): Query<PutKeyQuery>,
    body: Bytes,
) -> Response {
    put_via_balancer(&balancer, &key, query, body).await
}

async fn balancer_put_empty(
    State(balancer): State<Arc<LoadBalancer>>,
    Query(query): Query<PutKeyQuery>,
    body: Bytes,
) -> Response {
    put_via_balancer(&balancer, "", query, body).await
}

async fn put_via_balancer(
    balancer: &LoadBalancer,
    key: &str,
    query: PutKeyQuery,
    body: Bytes,
) -> Response {
    let status = balancer.put(key, body, query.context.as_deref()).await;
    let code = match status {
        PutStatus::Stored => StatusCode::OK,
        PutStatus::Failed => StatusCode::BAD_REQUEST,
        PutStatus::Misrouted => StatusCode::BAD_GATEWAY,
    };

    (code, axum::Json(PutResponse::status(status.code()))).into_response()
}
