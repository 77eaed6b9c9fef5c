// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains the worker side of a session:
//! - The compute engine boundary and the process-backed engine
//! - Generation-scoped worker pool management
//! - Worker report decoding

/// Compute engine boundary
///
/// Defines the [`Engine`] and [`EngineHandle`] traits and the
/// [`ProcessEngine`] that runs an external program per worker.
pub mod engine;

/// Worker pool manager
///
/// Starts one generation of workers per job and tears down the previous one.
pub mod scheduler;

/// Worker reports
///
/// Messages workers send back to the session, stamped with their generation.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::engine::{Assignment, Engine, EngineHandle, ProcessEngine};
pub use self::scheduler::{MiningJob, Scheduler, WorkerSlot};
pub use self::worker::{CandidateShare, ReportSender, WorkerMessage, WorkerReport};
