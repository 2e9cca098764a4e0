//! Error types for the protocol crate

use std::time::Duration;
use thiserror::Error;

/// Errors raised while encoding or decoding wire messages.
///
/// These are never retried: a malformed response will not become well-formed
/// by asking again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The payload is not parseable XML
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// A field the status message must always carry is absent
    #[error("Response is missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but its value cannot be interpreted
    #[error("Invalid value `{value}` for field `{field}`")]
    InvalidValue {
        /// Wire tag name
        field: &'static str,
        /// Raw text found in the tag
        value: String,
    },

    /// The envelope parsed but did not carry the expected message
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A set message was requested without any option in it
    #[error("Option set is empty")]
    EmptyOptions,
}

/// Errors returned by [`AirconClient`](crate::AirconClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket or send failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No response arrived within the response timeout
    #[error("No response from device after {0:?}")]
    Timeout(Duration),

    /// The device answered with something we could not understand
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client has been cleaned up
    #[error("Client has been closed")]
    Closed,
}

impl ClientError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// Only transport failures and timeouts qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout(_))
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
