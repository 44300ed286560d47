//! Error types for the search fleet

use thiserror::Error;

/// Result type alias using the fleet Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by nodes and the director
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Node unavailable: {address} ({reason})")]
    NodeUnavailable { address: String, reason: String },

    #[error("Connection closed by peer: {context}")]
    ConnectionClosed { context: String },

    #[error("Operation timeout: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // Protocol errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Frame too large: {length} bytes (limit {limit})")]
    FrameTooLarge { length: usize, limit: usize },

    #[error("Node replied with error: {message}")]
    Remote { message: String },

    // Node state errors
    #[error("No configuration loaded; send load_config first")]
    ConfigNotLoaded,

    #[error("Node index out of range: {index} (manifest has {nodes} nodes)")]
    NodeOutOfRange { index: usize, nodes: usize },

    // Search errors
    #[error("Search launch failed for node {node}: {message}")]
    SearchLaunch { node: usize, message: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Coordination errors
    #[error("Barrier timeout: {barrier_id} (waited {timeout_ms}ms)")]
    BarrierTimeout { barrier_id: String, timeout_ms: u64 },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Input errors
    #[error("Invalid FASTA input: {message}")]
    InvalidFasta { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error is a transport failure worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NodeUnavailable { .. } | Error::ConnectionClosed { .. } | Error::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig {
            message: e.to_string(),
        }
    }
}
