//! wsminer-rs - Stratum mining client for websocket tunneled pools
//!
//! This crate provides the session side of a browser-style mining client:
//! - Websocket transport, optionally tunneled through a proxy
//! - Stratum handshake, job and share handling
//! - Generation-scoped worker pools driving an external compute engine
//! - Share accounting, throughput aggregation and a status line

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Compute engine boundary, worker reports and the worker pool
pub mod miner;

/// Transport and Stratum protocol state
pub mod network;

/// Session orchestration
pub mod session;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{Engine, MiningJob, ProcessEngine, Scheduler};
pub use network::{Connection, PoolClient};
pub use session::{Session, SessionEvent, SessionOptions, Status};
pub use stats::{HardwareStats, MiningStats, StatsReporter};
pub use types::AlgorithmType;
pub use utils::{MinerError, init_logging};
