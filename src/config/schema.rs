//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the node process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identity and local execution settings.
    pub node: NodeSettings,

    /// Network-facing servers.
    pub rpc: RpcConfig,

    /// Key store settings.
    pub keys: KeysConfig,

    /// Startup and shutdown policy.
    pub lifecycle: LifecycleConfig,

    /// External ledger bridge.
    pub bridge: BridgeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node identity and local execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Human-readable node name.
    pub moniker: String,

    /// Chain identifier announced at startup and served over RPC.
    pub chain_id: String,

    /// Seconds per locally produced block when running without consensus.
    pub timeout_factor: f64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            moniker: "node".to_string(),
            chain_id: "local-chain".to_string(),
            timeout_factor: 1.0,
        }
    }
}

/// A network-facing server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub listen_host: String,
    pub listen_port: String,
}

impl ServerConfig {
    pub fn new(enabled: bool, listen_port: &str) -> Self {
        Self {
            enabled,
            listen_host: "127.0.0.1".to_string(),
            listen_port: listen_port.to_string(),
        }
    }

    /// `host:port` string to bind.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(false, "0")
    }
}

/// Prometheus scrape endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_host: String,
    pub listen_port: String,

    /// Path the registry is served under.
    pub metrics_path: String,

    /// Number of recent blocks sampled for block-time statistics.
    pub block_sample_size: usize,
}

impl MetricsConfig {
    /// The listener part of this section.
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            enabled: self.enabled,
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port.clone(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let server = ServerConfig::new(false, "9102");
        Self {
            enabled: server.enabled,
            listen_host: server.listen_host,
            listen_port: server.listen_port,
            metrics_path: "/metrics".to_string(),
            block_sample_size: 100,
        }
    }
}

/// All network-facing servers.
///
/// A section only overrides the fields it names; the rest keep that
/// server's own default rather than the generic `ServerConfig` one.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "RawRpcConfig")]
pub struct RpcConfig {
    /// Debug server (runtime vars, administrative shutdown).
    pub profiler: ServerConfig,
    /// Ethereum-style JSON-RPC.
    pub web3: ServerConfig,
    /// Node and chain status.
    pub info: ServerConfig,
    /// Query, transaction and key API.
    pub query: ServerConfig,
    pub metrics: MetricsConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            profiler: ServerConfig::new(false, "6060"),
            web3: ServerConfig::new(true, "26660"),
            info: ServerConfig::new(true, "26658"),
            query: ServerConfig::new(true, "10997"),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Server section as written in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerOverrides {
    enabled: Option<bool>,
    listen_host: Option<String>,
    listen_port: Option<String>,
}

impl ServerOverrides {
    fn apply(self, base: ServerConfig) -> ServerConfig {
        ServerConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            listen_host: self.listen_host.unwrap_or(base.listen_host),
            listen_port: self.listen_port.unwrap_or(base.listen_port),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRpcConfig {
    profiler: ServerOverrides,
    web3: ServerOverrides,
    info: ServerOverrides,
    query: ServerOverrides,
    metrics: MetricsConfig,
}

impl From<RawRpcConfig> for RpcConfig {
    fn from(raw: RawRpcConfig) -> Self {
        let base = RpcConfig::default();
        Self {
            profiler: raw.profiler.apply(base.profiler),
            web3: raw.web3.apply(base.web3),
            info: raw.info.apply(base.info),
            query: raw.query.apply(base.query),
            metrics: raw.metrics,
        }
    }
}

/// Filesystem key store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Expose key listing through the query server.
    pub service_enabled: bool,

    /// Directory holding key files.
    pub directory: String,

    /// Accept key files readable by group or others.
    pub allow_bad_file_permissions: bool,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            service_enabled: false,
            directory: ".keys".to_string(),
            allow_bad_file_permissions: false,
        }
    }
}

/// Startup and shutdown policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Total budget for the shutdown sweep, in seconds.
    pub shutdown_grace_secs: u64,

    /// Minimum time a process gets once the shutdown deadline has passed.
    pub best_effort_floor_ms: u64,

    /// Log a startup and shutdown announcement.
    pub announce: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
            best_effort_floor_ms: 100,
            announce: true,
        }
    }
}

/// External ledger bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,

    /// Control endpoint of the bridge process.
    pub control_url: String,

    /// Timeout for a single control request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            control_url: "http://127.0.0.1:26670/control".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
