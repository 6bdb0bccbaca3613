//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound connection (Axum)
//!     → server.rs (router, request ID, request metrics)
//!     → middleware/ (logger → attack detectors → custom stages)
//!     → forward.rs (rewrite for the fixed target, pooled send, timeout)
//!     → completion.rs (response body hooks fire once the body is done)
//!     → Send to client
//! ```
//!
//! `target.rs` resolves the fixed target once at construction; `response.rs`
//! holds the precomputed error responses.

pub mod completion;
pub mod forward;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod target;

pub use forward::ForwardingEngine;
pub use middleware::{LogSink, Next, Pipeline, RequestLogEvent, Stage};
pub use request::{RequestId, RequestIdExt};
pub use server::{ProxyOptions, ReverseProxy};
pub use target::TargetDescriptor;
