//! Configuration schema definitions.
//!
//! This module defines the configuration file structure for the standalone proxy.
//! All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Fixed upstream URL every request is forwarded to.
    pub target: Option<String>,

    /// Rewrite the outbound Host header to the target's host.
    pub change_origin: bool,

    /// Listener configuration (bind address, port).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound connection pool settings.
    pub pool: PoolConfig,

    /// Request logger settings.
    pub logging: RequestLoggingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Attack detectors, evaluated in the listed order.
    pub attack_detectors: Vec<AttackDetectorEntry>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address without port (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Port for standalone mode.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ListenerConfig {
    /// Full `host:port` socket address string.
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the upstream to produce a response head, in milliseconds.
    pub upstream_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_ms: 30_000,
        }
    }
}

/// Outbound connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent outbound sockets per protocol.
    pub max_sockets: usize,

    /// How long idle keep-alive connections are retained, in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sockets: 256,
            idle_timeout_secs: 30,
        }
    }
}

/// Request logger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLoggingConfig {
    /// Emit one log event per completed request.
    pub enabled: bool,
}

impl Default for RequestLoggingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One attack detector as written in the config file.
///
/// Exactly one of `path` or `path_pattern` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttackDetectorEntry {
    /// Exact request path to watch.
    #[serde(default)]
    pub path: Option<String>,

    /// Regular expression matched against the request path.
    #[serde(default)]
    pub path_pattern: Option<String>,

    /// Response status code that counts as a hit.
    pub status_code: u16,

    /// Hits within the window that fire the trigger.
    pub threshold: u32,

    /// Sliding window length in milliseconds.
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,
}

fn default_time_window_ms() -> u64 {
    1000
}
