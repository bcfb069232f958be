use dynamite_core::{
    DEFAULT_REQUEST_TIMEOUT, DynamiteError, Member, Result, RingConfig, StorageBackend,
    TokenStrategy,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_NODE_PORT: u16 = 25000;
pub const DEFAULT_BALANCER_PORT: u16 = 30000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Advertised `host:port` of this storage node. Defaults to `bind_addr`
    /// when that is a concrete address.
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    pub bind_addr: Option<String>,
    /// The static member list, one `host:port` per storage node.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("DYNAMITE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load from `path` if it exists, then apply `DYNAMITE_*` environment
    /// overrides. Nested fields use `__`, e.g. `DYNAMITE_RING__REPLICAS`.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(path, environment())
    }

    fn load(path: &str, environment: ::config::Environment) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(environment)
            .build()
            .map_err(|e| DynamiteError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| DynamiteError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Command-line values win over the file: extra `--server` entries are
    /// appended, `--port` replaces the listen port.
    pub fn apply_overrides(
        &mut self,
        servers: Vec<String>,
        port: Option<u16>,
        identity: Option<String>,
        default_port: u16,
    ) -> Result<()> {
        self.members.extend(servers);
        if let Some(port) = port {
            let mut addr = self.bind_socket_addr(default_port)?;
            addr.set_port(port);
            self.bind_addr = Some(addr.to_string());
        }
        if identity.is_some() {
            self.current_node = identity;
        }
        Ok(())
    }

    pub fn bind_socket_addr(&self, default_port: u16) -> Result<SocketAddr> {
        let bind_addr = self
            .bind_addr
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{}", default_port));
        bind_addr
            .parse()
            .map_err(|e| DynamiteError::Config(format!("invalid bind_addr {}: {}", bind_addr, e)))
    }

    pub fn member_list(&self) -> Result<Vec<Member>> {
        self.members
            .iter()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Err(DynamiteError::Config("member address cannot be empty".to_string()))
                } else {
                    Ok(Member::from(trimmed))
                }
            })
            .collect()
    }

    /// The identity a storage node puts on the ring.
    pub fn node_identity(&self, default_port: u16) -> Result<Member> {
        if let Some(current) = self.current_node.as_deref().map(str::trim) {
            if current.is_empty() {
                return Err(DynamiteError::Config("current_node cannot be empty".to_string()));
            }
            return Ok(Member::from(current));
        }

        let addr = self.bind_socket_addr(default_port)?;
        if addr.ip().is_unspecified() {
            return Err(DynamiteError::Config(format!(
                "current_node is required when binding to {}",
                addr
            )));
        }
        Ok(Member::from(addr.to_string()))
    }

    /// Ring parameters, refusing ones that separate processes cannot agree on.
    pub fn ring_config(&self) -> Result<RingConfig> {
        if self.ring.strategy == TokenStrategy::Randomized {
            return Err(DynamiteError::Config(
                "randomized tokens cannot be shared between nodes and the balancer".to_string(),
            ));
        }
        if self.ring.replicas == 0 {
            return Err(DynamiteError::Config("ring.replicas must be at least 1".to_string()));
        }
        Ok(self.ring)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.balancer.request_timeout_ms)
    }
}
