// src/cli/mod.rs
//! Command-line interface
//!
//! Subcommands: `start`, `algos` and `config`.

/// Clap definitions for every subcommand
pub mod commands;

pub use commands::{Action, Commands, ConfigOptions, StartOptions};
