//! Error types for gatekeep

use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed or empty client request (no upstream call is made)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream (or our own inspection of its output) blocked the content
    #[error("Blocked by content policy: {reason}")]
    Blocked { reason: String },

    /// Upstream returned a non-success status without block indicators
    #[error("Upstream failure (status {status}): {detail}")]
    UpstreamFailure { status: u16, detail: String },

    /// Network-level errors (connect, timeout, mid-stream transport faults)
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "request",
            RelayError::Blocked { .. } => "blocked",
            RelayError::UpstreamFailure { .. } => "upstream",
            RelayError::Network(_) => "network",
            RelayError::Config(_) => "config",
            RelayError::Io(_) => "io",
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
