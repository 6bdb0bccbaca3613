//! Request logging stage.
//!
//! Emits one [`RequestLogEvent`] per request once the response has been
//! fully sent (or abandoned), so the duration covers the streamed body.
//! Sinks are fire-and-forget; a failing or panicking sink is logged and
//! never affects the response.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::http::completion::on_complete;
use crate::http::middleware::{Next, Stage};
use crate::http::request::{client_ip, RequestIdExt};

/// One completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLogEvent {
    /// Milliseconds since the Unix epoch when the request arrived.
    pub timestamp_ms: u64,
    pub request_id: String,
    pub ip: String,
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
}

/// Destination for request log events.
pub trait LogSink: Send + Sync + 'static {
    fn record(&self, event: &RequestLogEvent);
}

impl<F> LogSink for F
where
    F: Fn(&RequestLogEvent) + Send + Sync + 'static,
{
    fn record(&self, event: &RequestLogEvent) {
        self(event)
    }
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, event: &RequestLogEvent) {
        tracing::info!(
            request_id = %event.request_id,
            ip = %event.ip,
            method = %event.method,
            path = %event.path,
            status = event.status,
            duration_ms = event.duration_ms,
            "Request completed"
        );
    }
}

/// Pipeline stage that reports every request to a [`LogSink`].
#[derive(Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl std::fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogger").finish_non_exhaustive()
    }
}

impl Stage for RequestLogger {
    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started = Instant::now();
            let timestamp_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();
            let request_id = request.request_id().to_string();
            let ip = client_ip(&request);
            let method = request.method().to_string();
            let path = request.uri().path().to_string();

            let response = next.run(request).await;
            let status = response.status().as_u16();

            let sink = self.sink.clone();
            on_complete(response, move || {
                let event = RequestLogEvent {
                    timestamp_ms,
                    request_id,
                    ip,
                    method,
                    path,
                    status,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                if catch_unwind(AssertUnwindSafe(|| sink.record(&event))).is_err() {
                    tracing::error!(
                        request_id = %event.request_id,
                        path = %event.path,
                        "Log sink panicked while recording request"
                    );
                }
            })
        })
    }
}
