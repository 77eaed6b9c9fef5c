// src/network/mod.rs
//! Network communication components
//!
//! Everything between the socket and the session:
//! - `transport`: websocket endpoint resolution, framing and the live `Connection`
//! - `messages`: Stratum wire types and the reply/push decode step
//! - `pool`: per-session protocol state (`PoolClient`)

/// Framed websocket transport
pub mod transport;

/// Stratum wire messages
pub mod messages;

/// Stratum protocol state
pub mod pool;

// Re-export main components for cleaner imports
pub use messages::{JobTemplate, RequestKind, StratumMessage, Subscription};
pub use pool::{PoolClient, PoolConfig};
pub use transport::{Backoff, Connection, ConnectionState};
