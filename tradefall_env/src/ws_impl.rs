//! Production feed transport over a WebSocket.

use crate::error::EnvError;
use crate::network::FeedTransport;
use crate::types::Endpoint;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport backed by tokio-tungstenite.
///
/// Pings are answered inline; binary and pong frames are dropped. Any read
/// or write failure discards the socket, so the next `next_text` returns
/// `None` until `connect` is called again.
pub struct WsTransport {
    endpoint: Endpoint,
    stream: Option<WsStream>,
}

impl WsTransport {
    /// Creates a transport for the given endpoint. Does not connect.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            stream: None,
        }
    }

    /// Returns true if a socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&mut self) -> Result<(), EnvError> {
        self.close().await;

        let (stream, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| EnvError::connection(e.to_string()))?;
        info!(host = self.endpoint.host(), "WebSocket connected");

        self.stream = Some(stream);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), EnvError> {
        let stream = self.stream.as_mut().ok_or(EnvError::NotConnected)?;
        let sent = stream.send(Message::Text(text)).await;
        if let Err(e) = sent {
            self.stream = None;
            return Err(EnvError::send(e.to_string()));
        }
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, EnvError>> {
        loop {
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Ping(payload))) => {
                    let pong = stream.send(Message::Pong(payload)).await;
                    if let Err(e) = pong {
                        self.stream = None;
                        return Some(Err(EnvError::send(e.to_string())));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by peer");
                    self.stream = None;
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read failed");
                    self.stream = None;
                    return Some(Err(EnvError::receive(e.to_string())));
                }
                None => {
                    self.stream = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "WebSocket close handshake failed");
            }
        }
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}
