//! Error types for seqplay-player
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Only configuration and scheduling failures surface to the
//! caller of a lifecycle transition; engine errors and routing anomalies are
//! handled internally and observable through logs and the event stream.

use thiserror::Error;

/// Main error type for the seqplay player
#[derive(Error, Debug)]
pub enum Error {
    /// Unreadable, unparsable, or empty playlist
    #[error("Configuration error: {0}")]
    Config(String),

    /// Clock subsystem refused to arm a segment timer
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Decoding engine rejected an operation
    #[error("Engine error: {0}")]
    Engine(String),

    /// Lifecycle transition attempted from an invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors (playlist file reads)
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Playlist document parse errors
    #[error("Playlist parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type using the seqplay-player Error
pub type Result<T> = std::result::Result<T, Error>;
