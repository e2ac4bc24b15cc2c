//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate listen addresses and detect port clashes between servers
//! - Validate value ranges (block time, grace period, request timeouts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before any launcher starts

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{NodeConfig, ServerConfig};

/// Bounds on `node.timeout_factor`, in seconds.
pub const MIN_TIMEOUT_FACTOR: f64 = 0.001;
pub const MAX_TIMEOUT_FACTOR: f64 = 86_400.0;

/// Upper bound for `lifecycle.shutdown_grace_secs`.
pub const MAX_SHUTDOWN_GRACE_SECS: u64 = 3_600;

/// Upper bound for `lifecycle.best_effort_floor_ms`.
pub const MAX_BEST_EFFORT_FLOOR_MS: u64 = 60_000;

/// Upper bound for `bridge.request_timeout_secs`.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate the whole configuration.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !(MIN_TIMEOUT_FACTOR..=MAX_TIMEOUT_FACTOR).contains(&config.node.timeout_factor) {
        errors.push(ValidationError::new(
            "node.timeout_factor",
            format!("must be between {MIN_TIMEOUT_FACTOR} and {MAX_TIMEOUT_FACTOR} seconds"),
        ));
    }
    if config.node.chain_id.trim().is_empty() {
        errors.push(ValidationError::new("node.chain_id", "must not be empty"));
    }

    let metrics_server = config.rpc.metrics.server();
    let servers: [(&str, &ServerConfig); 5] = [
        ("rpc.profiler", &config.rpc.profiler),
        ("rpc.web3", &config.rpc.web3),
        ("rpc.info", &config.rpc.info),
        ("rpc.query", &config.rpc.query),
        ("rpc.metrics", &metrics_server),
    ];
    let mut ports: HashMap<u16, &str> = HashMap::new();
    for (field, server) in servers.iter().filter(|(_, s)| s.enabled) {
        match server.listen_address().parse::<SocketAddr>() {
            Ok(addr) if addr.port() != 0 => {
                if let Some(other) = ports.insert(addr.port(), *field) {
                    errors.push(ValidationError::new(
                        *field,
                        format!("port {} already used by {}", addr.port(), other),
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(
                *field,
                format!("invalid listen address {}: {}", server.listen_address(), e),
            )),
        }
    }

    if config.rpc.metrics.enabled && !config.rpc.metrics.metrics_path.starts_with('/') {
        errors.push(ValidationError::new("rpc.metrics.metrics_path", "must start with '/'"));
    }

    if config.keys.service_enabled && config.keys.directory.trim().is_empty() {
        errors.push(ValidationError::new(
            "keys.directory",
            "required when the key service is enabled",
        ));
    }

    if !(1..=MAX_SHUTDOWN_GRACE_SECS).contains(&config.lifecycle.shutdown_grace_secs) {
        errors.push(ValidationError::new(
            "lifecycle.shutdown_grace_secs",
            format!("must be between 1 and {MAX_SHUTDOWN_GRACE_SECS}"),
        ));
    }
    if config.lifecycle.best_effort_floor_ms > MAX_BEST_EFFORT_FLOOR_MS {
        errors.push(ValidationError::new(
            "lifecycle.best_effort_floor_ms",
            format!("must be at most {MAX_BEST_EFFORT_FLOOR_MS}"),
        ));
    }

    if config.bridge.enabled {
        match url::Url::parse(&config.bridge.control_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                "bridge.control_url",
                format!("unsupported scheme {}", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("bridge.control_url", e.to_string())),
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&config.bridge.request_timeout_secs) {
            errors.push(ValidationError::new(
                "bridge.request_timeout_secs",
                format!("must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate_config(&NodeConfig::default()).unwrap();
    }

    #[test]
    fn reports_every_problem() {
        let mut config = NodeConfig::default();
        config.rpc.info.listen_host = "not a host".into();
        config.lifecycle.shutdown_grace_secs = 0;
        config.node.timeout_factor = 0.0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["node.timeout_factor", "rpc.info", "lifecycle.shutdown_grace_secs"]
        );
    }

    #[test]
    fn timeout_factor_bounded_at_both_ends() {
        for factor in [1e-12, 1e20, f64::NAN, f64::INFINITY, -1.0] {
            let mut config = NodeConfig::default();
            config.node.timeout_factor = factor;
            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors[0].field, "node.timeout_factor", "accepted {factor}");
        }

        let mut config = NodeConfig::default();
        config.node.timeout_factor = MIN_TIMEOUT_FACTOR;
        validate_config(&config).unwrap();
        config.node.timeout_factor = MAX_TIMEOUT_FACTOR;
        validate_config(&config).unwrap();
    }

    #[test]
    fn shutdown_budgets_bounded() {
        let mut config = NodeConfig::default();
        config.lifecycle.shutdown_grace_secs = u64::MAX;
        config.lifecycle.best_effort_floor_ms = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["lifecycle.shutdown_grace_secs", "lifecycle.best_effort_floor_ms"]
        );
    }

    #[test]
    fn detects_port_clash_between_enabled_servers() {
        let mut config = NodeConfig::default();
        config.rpc.query.listen_port = config.rpc.info.listen_port.clone();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rpc.query");
        assert!(errors[0].message.contains("rpc.info"));
    }

    #[test]
    fn ignores_disabled_servers_and_ephemeral_ports() {
        let mut config = NodeConfig::default();
        config.rpc.profiler.listen_port = config.rpc.info.listen_port.clone();
        config.rpc.web3.listen_port = "0".into();
        config.rpc.query.listen_port = "0".into();
        validate_config(&config).unwrap();
    }

    #[test]
    fn bridge_url_checked_only_when_enabled() {
        let mut config = NodeConfig::default();
        config.bridge.control_url = "nonsense".into();
        validate_config(&config).unwrap();

        config.bridge.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "bridge.control_url");
    }

    #[test]
    fn keys_service_needs_directory() {
        let mut config = NodeConfig::default();
        config.keys.service_enabled = true;
        config.keys.directory = String::new();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "keys.directory");
    }
}
