//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C in the binary → Shutdown::trigger → serve stops accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every server subscribes before it starts
//! - In-flight responses finish streaming before `serve` returns

pub mod shutdown;

pub use shutdown::Shutdown;
