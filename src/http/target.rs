//! Fixed upstream target resolution.
//!
//! # Responsibilities
//! - Parse and validate the target URL once, at proxy construction
//! - Derive hostname, port, Host header value and protocol
//! - Pre-build the scheme and authority used for every outbound URI
//!
//! # Design Decisions
//! - The descriptor is immutable and never re-derived per request
//! - Only absolute `http` and `https` URLs are accepted

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderValue, Uri};
use url::Url;

use crate::error::{ProxyError, Result};

/// The resolved, immutable upstream target.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    hostname: String,
    port: u16,
    host_header: HeaderValue,
    is_secure: bool,
    scheme: Scheme,
    authority: Authority,
}

impl TargetDescriptor {
    /// Parse a target URL into a descriptor.
    ///
    /// Fails with [`ProxyError::TargetRequired`] for an empty string and
    /// [`ProxyError::InvalidTarget`] for anything that is not an absolute
    /// `http`/`https` URL with a host.
    pub fn resolve(target_url: &str) -> Result<Self> {
        let trimmed = target_url.trim();
        if trimmed.is_empty() {
            return Err(ProxyError::TargetRequired);
        }

        let url = Url::parse(trimmed)
            .map_err(|e| ProxyError::invalid_target(trimmed, e.to_string()))?;

        let (scheme, is_secure) = match url.scheme() {
            "http" => (Scheme::HTTP, false),
            "https" => (Scheme::HTTPS, true),
            other => {
                return Err(ProxyError::invalid_target(
                    trimmed,
                    format!("unsupported scheme '{}'", other),
                ))
            }
        };

        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxyError::invalid_target(trimmed, "missing host"))?
            .to_string();

        // `port_or_known_default` always succeeds for http/https.
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProxyError::invalid_target(trimmed, "missing port"))?;

        // `Url::port` is None when the port equals the scheme default.
        let host_with_port = match url.port() {
            Some(explicit) => format!("{}:{}", hostname, explicit),
            None => hostname.clone(),
        };

        let authority = Authority::try_from(host_with_port.as_str())
            .map_err(|e| ProxyError::invalid_target(trimmed, e.to_string()))?;
        let host_header = HeaderValue::from_str(&host_with_port)
            .map_err(|e| ProxyError::invalid_target(trimmed, e.to_string()))?;

        Ok(Self {
            hostname,
            port,
            host_header,
            is_secure,
            scheme,
            authority,
        })
    }

    /// Target hostname (IPv6 literals keep their brackets).
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Target port, explicit or protocol default.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value written to the outbound Host header when `change_origin` is set.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }

    /// Whether the target is reached over TLS.
    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Build the outbound URI for an inbound path-and-query.
    ///
    /// Only the path and query of the inbound request are used, so the
    /// destination can never be steered by client input.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Uri {
        let path_and_query = path_and_query
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        let mut parts = axum::http::uri::Parts::default();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        parts.path_and_query = Some(path_and_query);

        // Scheme, authority and path are all pre-validated, so this cannot fail.
        Uri::from_parts(parts).unwrap_or_else(|_| Uri::from_static("/"))
    }
}

impl std::fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}
