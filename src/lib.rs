//! Fixed-target reverse proxy with per-path attack detection.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────────────┐
//!                     │                      REVERSE PROXY                         │
//!                     │                                                            │
//!   Client Request    │  ┌─────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐  │
//!   ──────────────────┼─▶│  axum   │──▶│ logger  │──▶│ attack    │──▶│ custom   │  │
//!                     │  │ router  │   │ stage   │   │ detectors │   │ stages   │  │
//!                     │  └─────────┘   └─────────┘   └───────────┘   └────┬─────┘  │
//!                     │                                                   │        │
//!                     │                                                   ▼        │
//!   Client Response   │  ┌──────────────────┐        ┌─────────────────────────┐   │
//!   ◀─────────────────┼──│ completion hooks │◀───────│   forwarding engine     │◀──┼── Fixed
//!                     │  │ (log, detect)    │        │ filter → pool → timeout │   │   Target
//!                     │  └──────────────────┘        └─────────────────────────┘   │
//!                     │                                                            │
//!                     │  config · observability · lifecycle · error                │
//!                     └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Every request is forwarded to the one target given at construction. The
//! client can influence the path, method, headers and body, never the
//! destination. Hop-by-hop headers are dropped, upstream stalls become a
//! 504 and connection failures a 500.
//!
//! ```no_run
//! use sentinel_proxy::{AttackDetectorConfig, ProxyOptions, ReverseProxy, Shutdown};
//!
//! # async fn run() -> sentinel_proxy::Result<()> {
//! let detector = AttackDetectorConfig::builder()
//!     .path("/login")
//!     .status_code(401)
//!     .threshold(5)
//!     .on_trigger(|event| {
//!         println!("{} failed to log in {} times", event.ip, event.hits);
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let proxy = ReverseProxy::new(
//!     ProxyOptions::new("http://127.0.0.1:3000")
//!         .port(8080)
//!         .attack_detector(detector),
//! )?;
//!
//! let shutdown = Shutdown::new();
//! proxy.listen(shutdown.subscribe()).await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{BoxError, ProxyError, Result};
pub use http::{LogSink, ProxyOptions, RequestLogEvent, ReverseProxy, Stage};
pub use lifecycle::Shutdown;
pub use net::ConnectionPools;
pub use security::{AttackDetector, AttackDetectorConfig, TriggerEvent};
