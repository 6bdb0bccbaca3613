//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine
//!     → pool.rs (wait for a socket slot, pick plain or TLS client)
//!     → hyper-util client (keep-alive reuse, TCP_NODELAY)
//!     → Upstream target
//! ```
//!
//! # Design Decisions
//! - One pool per protocol, shared by every proxy instance unless one is injected
//! - Exhaustion queues on a semaphore instead of rejecting
//! - A slot is held until the response body completes or is dropped

pub mod pool;

pub use pool::{ConnectionPool, ConnectionPools, PoolSettings, PoolSlot, Protocol};
