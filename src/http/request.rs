//! Request inspection helpers.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) per inbound request
//! - Resolve the client IP shared by the logger and the attack detectors
//! - Extract the path and user agent used by the detectors
//!
//! # Design Decisions
//! - The request ID lives in request extensions only; it is never added to
//!   the forwarded headers
//! - IP resolution order: CF-Connecting-IP → first X-Forwarded-For entry →
//!   X-Real-IP → transport peer → "unknown"

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};
use uuid::Uuid;

/// Literal used when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Unique identifier for one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extension trait for reading the request ID off a request.
pub trait RequestIdExt {
    /// The request ID, or a fresh one if none was assigned.
    fn request_id(&self) -> RequestId;
}

impl RequestIdExt for Request<Body> {
    fn request_id(&self) -> RequestId {
        self.extensions()
            .get::<RequestId>()
            .copied()
            .unwrap_or_default()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the client IP from forwarding headers, falling back to the peer address.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }

    if let Some(first) = header_str(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Resolve the client IP of an inbound request.
///
/// The peer address comes from axum's `ConnectInfo`, present when the router
/// is served with `into_make_service_with_connect_info`.
pub fn client_ip(request: &Request<Body>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    resolve_client_ip(request.headers(), peer)
}

/// The User-Agent header, if present and valid UTF-8.
pub fn user_agent(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
