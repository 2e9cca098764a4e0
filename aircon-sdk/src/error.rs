use std::net::SocketAddr;

use aircon_protocol::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    /// The originating client error, untouched
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// A poll shared with a concurrent caller failed
    #[error("Status refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Command queue is closed")]
    QueueClosed,

    #[error("Device {0} has been cleaned up")]
    DeviceClosed(SocketAddr),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SdkError>;
