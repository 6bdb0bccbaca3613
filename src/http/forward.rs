//! Forwarding engine: the terminal stage of every pipeline.
//!
//! # Responsibilities
//! - Rewrite the inbound request for the fixed target (URI, Host, headers)
//! - Send it over the pooled connection for the target's protocol
//! - Stream the upstream response back without buffering
//! - Map upstream failures to fixed 504 / 500 responses
//!
//! # Design Decisions
//! - One attempt per request; no retry, backoff or circuit breaking
//! - The deadline covers queueing for a pool slot and waiting for the
//!   response head; once the head is returned the body streams freely
//! - Dropping the in-flight exchange (timeout or client disconnect) drops
//!   the outbound connection with it

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use hyper::body::Incoming;

use crate::error::{ProxyError, Result};
use crate::http::completion::on_complete;
use crate::http::request::RequestIdExt;
use crate::http::response;
use crate::http::target::TargetDescriptor;
use crate::net::pool::{ConnectionPool, ConnectionPools, PoolSlot};
use crate::observability::metrics;
use crate::security::headers::filter_headers;

/// Default time allowed for the upstream to produce a response head.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Streams requests to the fixed target and responses back to the client.
#[derive(Debug)]
pub struct ForwardingEngine {
    target: Arc<TargetDescriptor>,
    change_origin: bool,
    pool: Arc<ConnectionPool>,
    timeout: Duration,
}

impl ForwardingEngine {
    /// Create an engine for `target`, picking the matching pool from `pools`.
    pub fn new(
        target: Arc<TargetDescriptor>,
        change_origin: bool,
        pools: &ConnectionPools,
        timeout: Duration,
    ) -> Self {
        let pool = pools.for_target(&target);
        Self {
            target,
            change_origin,
            pool,
            timeout,
        }
    }

    /// The target this engine forwards to.
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Forward one request. Never fails: upstream errors become error responses.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let request_id = request.request_id();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let started = Instant::now();

        let outbound = self.outbound_request(request);

        match self.exchange(outbound).await {
            Ok((upstream, slot)) => {
                tracing::debug!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = upstream.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Upstream responded"
                );
                let (parts, body) = upstream.into_parts();
                let response = Response::from_parts(parts, Body::new(body));
                on_complete(response, move || drop(slot))
            }
            Err(ProxyError::UpstreamTimeout { timeout_ms }) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    target = %self.target,
                    timeout_ms,
                    "Upstream timed out"
                );
                metrics::record_upstream_error("timeout");
                response::gateway_timeout()
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    target = %self.target,
                    error = %e,
                    "Upstream error"
                );
                metrics::record_upstream_error("connect");
                response::proxy_error()
            }
        }
    }

    /// Build the outbound request for the fixed target.
    ///
    /// Method, path and query are copied verbatim. Only the path and query of
    /// the inbound URI are used, so neither an absolute-form URI nor a Host
    /// header can redirect the request.
    pub fn outbound_request(&self, request: Request<Body>) -> Request<Body> {
        let (parts, body) = request.into_parts();

        let mut headers = filter_headers(&parts.headers);
        if self.change_origin {
            headers.insert(header::HOST, self.target.host_header().clone());
        } else {
            // The client fills Host in from the target URI.
            headers.remove(header::HOST);
        }

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = self.target.uri_for(parts.uri.path_and_query());
        *outbound.headers_mut() = headers;
        outbound
    }

    async fn exchange(&self, request: Request<Body>) -> Result<(Response<Incoming>, PoolSlot)> {
        let attempt = async {
            let slot = self.pool.acquire().await;
            let response = self
                .pool
                .send(request)
                .await
                .map_err(ProxyError::UpstreamConnection)?;
            Ok::<_, ProxyError>((response, slot))
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::UpstreamTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::pool::PoolSettings;
    use axum::http::Method;

    fn engine(target: &str, change_origin: bool) -> ForwardingEngine {
        let pools = ConnectionPools::new(PoolSettings::default()).unwrap();
        let target = Arc::new(TargetDescriptor::resolve(target).unwrap());
        ForwardingEngine::new(target, change_origin, &pools, DEFAULT_UPSTREAM_TIMEOUT)
    }

    fn inbound() -> Request<Body> {
        Request::builder()
            .method(Method::PATCH)
            .uri("http://attacker.example/api/items?id=7&target=http://attacker.example")
            .header("Host", "attacker.example")
            .header("Connection", "keep-alive")
            .header("X-Custom", "kept")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn copies_method_and_path_to_fixed_target() {
        let outbound = engine("http://127.0.0.1:4000", false).outbound_request(inbound());
        assert_eq!(outbound.method(), Method::PATCH);
        assert_eq!(
            outbound.uri().to_string(),
            "http://127.0.0.1:4000/api/items?id=7&target=http://attacker.example"
        );
        assert_eq!(outbound.headers()["x-custom"], "kept");
        assert!(outbound.headers().get("connection").is_none());
    }

    #[test]
    fn strips_client_host_without_change_origin() {
        let outbound = engine("http://127.0.0.1:4000", false).outbound_request(inbound());
        assert!(outbound.headers().get(header::HOST).is_none());
    }

    #[test]
    fn rewrites_host_with_change_origin() {
        let outbound = engine("https://api.example.com", true).outbound_request(inbound());
        assert_eq!(outbound.headers()[header::HOST], "api.example.com");
        assert_eq!(outbound.uri().scheme_str(), Some("https"));
    }
}
