//! Fixed proxy error responses.
//!
//! # Design Decisions
//! - Backend timeouts result in 504 Gateway Timeout
//! - Every other upstream failure results in 500 with a "Proxy Error" body
//! - Both JSON bodies are serialised once and shared afterwards

use std::sync::LazyLock;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::json;

static GATEWAY_TIMEOUT_BODY: LazyLock<Bytes> = LazyLock::new(|| {
    Bytes::from(
        json!({
            "error": "Gateway Timeout",
            "message": "Target server took too long to respond",
        })
        .to_string(),
    )
});

static PROXY_ERROR_BODY: LazyLock<Bytes> = LazyLock::new(|| {
    Bytes::from(
        json!({
            "error": "Proxy Error",
            "message": "An error occurred during proxy request",
        })
        .to_string(),
    )
});

fn json_response(status: StatusCode, body: &Bytes) -> Response {
    let mut response = Response::new(Body::from(body.clone()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// 504 response sent when the upstream does not answer in time.
pub fn gateway_timeout() -> Response {
    json_response(StatusCode::GATEWAY_TIMEOUT, &GATEWAY_TIMEOUT_BODY)
}

/// 500 response sent for any other upstream failure.
pub fn proxy_error() -> Response {
    json_response(StatusCode::INTERNAL_SERVER_ERROR, &PROXY_ERROR_BODY)
}
