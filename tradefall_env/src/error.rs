//! Error types for the Tradefall environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Establishing the feed connection failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Writing to the feed failed (socket closed, broken pipe, etc.)
    #[error("Send error: {0}")]
    SendError(String),

    /// Reading from the feed failed
    #[error("Receive error: {0}")]
    ReceiveError(String),

    /// The feed endpoint could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Creates a send error.
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendError(msg.into())
    }

    /// Creates a receive error.
    pub fn receive(msg: impl Into<String>) -> Self {
        Self::ReceiveError(msg.into())
    }
}
