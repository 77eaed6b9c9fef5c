// src/cli/commands.rs
use crate::types::AlgorithmType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// wsminer-rs - Stratum mining client over websocket proxies
#[derive(Parser, Debug)]
#[command(name = "wsminer-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, list algorithms, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining operation with specified options
    Start(StartOptions),

    /// List supported algorithms
    Algos,

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Number of workers to use (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Mining algorithm to use (overrides config)
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
