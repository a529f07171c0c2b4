//! # Error Types
//!
//! Custom error types for Groundlink using `thiserror`.

use thiserror::Error;

/// Main error type for Groundlink
#[derive(Debug, Error)]
pub enum GroundlinkError {
    /// Requested port matches no enumerated candidate
    #[error("No device found: {0}")]
    NoDeviceFound(String),

    /// Serial enumeration or open failure
    #[error("Serial error: {0}")]
    Serial(String),

    /// Invalid component configuration (fatal at construction)
    #[error("Invalid construction: {0}")]
    Constructor(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background worker ended with an error or panicked
    #[error("Worker failure: {0}")]
    Worker(String),
}

/// Result type alias for Groundlink
pub type Result<T> = std::result::Result<T, GroundlinkError>;
