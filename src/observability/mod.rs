//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages and the forwarding engine produce:
//!     → logging.rs (subscriber setup for structured tracing events)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event; request ID flows through all stages
//! - Metrics are cheap (no-op until a recorder is installed)

pub mod logging;
pub mod metrics;
