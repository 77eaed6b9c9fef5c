// src/utils/error.rs
use crate::miner::worker::WorkerMessage;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for the mining client
///
/// Configuration errors are fatal and surface before any connection is
/// attempted. Everything else is reported by the session as an event
/// while it keeps running.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Missing or invalid configuration (fatal)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// A frame was sent while the connection was not open
    #[error("Not connected")]
    NotConnected,

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Compute engine failed to start or crashed
    #[error("Engine error: {0}")]
    EngineError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// WebSocket communication errors
    #[error("WebSocket error: {0}")]
    WsError(#[from] tungstenite::Error),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

/// Converts worker report channel send errors into MinerError
///
/// Happens only when the session dropped its receiving end, i.e. the
/// session is gone and the report has nowhere to go.
impl From<tokio::sync::mpsc::error::SendError<WorkerMessage>> for MinerError {
    fn from(e: tokio::sync::mpsc::error::SendError<WorkerMessage>) -> Self {
        MinerError::ChannelError(format!("Worker report send failed: {}", e))
    }
}
