// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! Error handling and logging infrastructure shared by the whole client.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum which defines all possible error conditions
/// for the mining client, along with conversion implementations.
pub mod error;

/// Logging configuration
pub mod logging;

// Re-export for easier access
pub use error::MinerError;
pub use logging::init_logging;
