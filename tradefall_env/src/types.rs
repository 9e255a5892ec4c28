//! Common types for the Tradefall environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use url::Url;

/// A validated WebSocket endpoint for the trade feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parses an endpoint, accepting only `ws://` and `wss://` schemes.
    pub fn parse(raw: &str) -> Result<Self, EnvError> {
        let url = Url::parse(raw).map_err(|e| EnvError::InvalidEndpoint(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self(url)),
            other => Err(EnvError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                other, raw
            ))),
        }
    }

    /// Returns the endpoint as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the host portion (for logging).
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or("unknown")
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EnvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0.into()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
