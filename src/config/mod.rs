//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides applied by the binary
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → ProxyOptions built from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the target never changes for a running instance
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AttackDetectorEntry, ListenerConfig, ObservabilityConfig, PoolConfig, ProxyConfig,
    RequestLoggingConfig, TimeoutConfig,
};
