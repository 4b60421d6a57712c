//! Error types for simbox
//!
//! Provides a unified error type used across all simbox crates.

use std::path::PathBuf;

/// Main error type for simbox operations
#[derive(Debug, thiserror::Error)]
pub enum SimboxError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Filesystem Cache Errors ===

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    // === Remote Store Errors ===

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote store rejected request: {0}")]
    RemoteRejected(String),

    #[error("Domain resolution failed: {0}")]
    DomainResolution(String),

    // === Transport Errors ===

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Terminal endpoint not resolved")]
    EndpointUnresolved,

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Session Errors ===

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SimboxError {
    /// Create a remote-unavailable error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteUnavailable(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Remote and transport failures are worth another attempt; conflicts in
    /// the local cache never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable(_)
                | Self::RemoteRejected(_)
                | Self::DomainResolution(_)
                | Self::Transport(_)
                | Self::Timeout { .. }
        )
    }
}

/// Result type alias using SimboxError
pub type Result<T> = std::result::Result<T, SimboxError>;
