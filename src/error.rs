//! Error types for the proxy.
//!
//! Construction-time failures (`TargetRequired`, `InvalidTarget`, `InvalidDetectorConfig`,
//! `Tls`, `Config`) are fatal to building a proxy instance. Per-request failures
//! (`UpstreamTimeout`, `UpstreamConnection`) are recovered locally by the forwarding engine
//! and mapped to fixed error responses. `TriggerCallback` is only ever logged.

use thiserror::Error;

use crate::config::loader::ConfigError;

/// Boxed error type accepted from user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// No target URL was supplied.
    #[error("A target URL is required")]
    TargetRequired,

    /// The target URL is malformed or not an absolute http(s) URL.
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    /// An attack detector configuration is missing a field or has an invalid value.
    #[error("Invalid attack detector configuration: {message}")]
    InvalidDetectorConfig { message: String },

    /// The upstream did not produce a response head in time.
    #[error("Upstream did not respond within {timeout_ms} ms")]
    UpstreamTimeout { timeout_ms: u64 },

    /// Connecting to or talking with the upstream failed.
    #[error("Upstream connection error: {0}")]
    UpstreamConnection(#[source] hyper_util::client::legacy::Error),

    /// A trigger callback returned an error or panicked.
    #[error("Attack detector trigger callback failed: {message}")]
    TriggerCallback { message: String },

    /// TLS client setup for secure upstreams failed.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// Configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Creates a new invalid-target error.
    pub fn invalid_target(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new detector configuration error.
    pub fn invalid_detector(message: impl Into<String>) -> Self {
        Self::InvalidDetectorConfig {
            message: message.into(),
        }
    }
}

/// Result type alias using ProxyError.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProxyError::invalid_target("not a url", "relative URL without a base");
        assert!(err.to_string().contains("not a url"));

        let err = ProxyError::invalid_detector("threshold must be greater than 0");
        assert!(err.to_string().contains("threshold"));

        let err = ProxyError::UpstreamTimeout { timeout_ms: 30_000 };
        assert!(err.to_string().contains("30000"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let proxy_err: ProxyError = io_err.into();
        assert!(matches!(proxy_err, ProxyError::Io(_)));
    }
}
