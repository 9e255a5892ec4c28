//! Error taxonomy for the pipeline.
//!
//! Decode and feed errors are absorbed where they occur (logged, message or
//! connection dropped). A duplicate entity id is a logic bug and panics
//! inside [`crate::pool::EntityPool`] instead of appearing here.

use thiserror::Error;

/// A feed message that looked like a trade but could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Payload was not valid JSON or had the wrong shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Trade message lacks a required field
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// Quantity, price or their product is non-numeric, non-finite or not positive
    #[error("Malformed number in '{field}': {value:?}")]
    MalformedNumber { field: &'static str, value: String },
}

/// Transport-level feed failures. Handled by the listener's reconnect loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    /// Connect failed or an open connection dropped
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The subscribe directive could not be delivered
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Too many consecutive connection failures
    #[error("Gave up after {0} consecutive connection failures")]
    RetriesExhausted(u32),
}

/// Configuration that cannot drive a sensible simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Creates an invalid-field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures of the simulation driver task itself.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The driver task ended without handing back its state
    #[error("Simulation driver stopped without returning its state")]
    DriverLost,
}
