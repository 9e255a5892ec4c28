//! Error types for the simulation harness and CLI.

use thiserror::Error;
use tradefall_core::{ConfigError, FeedError, SimulationError};
use tradefall_env::EnvError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A spawned task panicked or was cancelled
    #[error("Task '{0}' ended unexpectedly")]
    TaskLost(&'static str),

    #[error("World was never started")]
    NotStarted,
}
