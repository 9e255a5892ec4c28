//! Feed transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;

/// Abstraction over the connection to the trade event source.
///
/// The pipeline only ever sees text frames; framing, TLS and ping handling
/// are the transport's business.
///
/// # Implementations
///
/// - **Production**: `WsTransport` over tokio-tungstenite
/// - **Simulation**: `ScriptedTransport` (in `tradefall_sim`) replaying canned sessions
///
/// # Session Flow
///
/// ```text
/// Listener                  Transport                  Exchange
///   |-- connect() ------------->|-- TCP/TLS/WS ----------->|
///   |-- send_text(SUBSCRIBE) -->|------------------------->|
///   |<-- next_text() -----------|<-- trade frames ---------|
///   |<-- None ------------------|<-- close / EOF ----------|
/// ```
#[async_trait]
pub trait FeedTransport: Send + 'static {
    /// Opens a new connection, replacing any previous one.
    async fn connect(&mut self) -> Result<(), EnvError>;

    /// Sends a text frame (e.g. a subscribe directive).
    ///
    /// # Returns
    /// * `Err(EnvError::NotConnected)` - No open connection
    async fn send_text(&mut self, text: String) -> Result<(), EnvError>;

    /// Receives the next text frame.
    ///
    /// # Returns
    /// * `Some(Ok(text))` - A frame arrived
    /// * `Some(Err(_))` - The connection failed mid-read
    /// * `None` - The connection was closed by the peer
    async fn next_text(&mut self) -> Option<Result<String, EnvError>>;

    /// Closes the connection if one is open. Idempotent.
    async fn close(&mut self);

    /// Returns a human-readable description of the remote end.
    fn describe(&self) -> String;
}
