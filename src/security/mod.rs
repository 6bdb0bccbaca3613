//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound request:
//!     → headers.rs (drop hop-by-hop headers before forwarding)
//!
//! Completed response:
//!     → attack_detector.rs (path + status match → per-IP sliding window → trigger)
//! ```
//!
//! # Design Decisions
//! - Detection never blocks or alters a response; it only reports
//! - No trust in client input: the forwarded destination comes from config only

pub mod attack_detector;
pub mod headers;

pub use attack_detector::{
    AttackDetector, AttackDetectorConfig, AttackDetectorConfigBuilder, PathMatcher,
    TriggerCallback, TriggerEvent,
};
