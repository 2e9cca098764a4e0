//! Error types for the discovery probe.

use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket creation, option or send failure
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
