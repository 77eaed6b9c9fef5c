//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Per-worker throughput aggregation
//! - Share acceptance/rejection tracking
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! [`Stats`] is owned and mutated by the session; [`StatsReporter`] only
//! sees the events the session sends it.

/// Share counters and throughput aggregation
pub mod aggregator;

/// Submodule containing the statistics reporter implementation
///
/// The reporter handles:
/// - Rendering the status line
/// - Hardware monitoring
/// - Logging errors and disconnects
pub mod reporter;

// Re-export main components
pub use aggregator::{MiningStats, ShareResult, Stats};
pub use reporter::{HardwareStats, StatsReporter, StatusLine, format_hashrate};
