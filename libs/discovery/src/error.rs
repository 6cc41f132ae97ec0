//! Error types for discovery operations.

use thiserror::Error;

/// Errors that can occur when talking to the discovery backend.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The request could not be sent or the connection failed.
    #[error("discovery transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("discovery backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend's response could not be decoded.
    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        DiscoveryError::Transport(err.to_string())
    }
}
