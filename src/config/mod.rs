// src/config/mod.rs
//! Configuration management for the mining client
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files (TOML, or JSON by extension)
//! - Validating required fields before anything connects
//! - Generating configuration templates

/// Core configuration implementation
///
/// Contains the [`Config`] struct and related types that define
/// the client's configuration structure and behavior.
pub mod config;

// Re-export key items for easy access
pub use config::{Config, EngineConfig, ReconnectConfig};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads client configuration from a file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read or parsed
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
