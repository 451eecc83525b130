//! Outbound WebSocket connections to relay addresses.

use crate::domain::error::TransportError;
use crate::transport::link::{self, LinkPeer, SocketLink};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Default handshake deadline for relay connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens relay connections.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Connect to `address` (already normalized, scheme included).
    async fn connect(&self, address: &str) -> Result<SocketLink, TransportError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    buffer: usize,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn connect(&self, address: &str) -> Result<SocketLink, TransportError> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(address))
            .await
            .map_err(|_| TransportError::ConnectTimeout(address.to_owned()))?
            .map_err(|e| TransportError::Connect {
                address: address.to_owned(),
                reason: e.to_string(),
            })?;

        let (link, peer) = link::pair(self.buffer);
        tokio::spawn(pump(stream, peer, address.to_owned()));
        Ok(link)
    }
}

/// Move frames between a relay socket and its link until either side closes.
async fn pump(
    mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut peer: LinkPeer,
    address: String,
) {
    loop {
        tokio::select! {
            outgoing = peer.from_local.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = socket.send(Message::Text(text.into())).await {
                        warn!(address = %address, error = %e, "Failed to send to relay");
                        break;
                    }
                }
                None => {
                    // Local side dropped the link: close the socket
                    let _ = socket.close(None).await;
                    break;
                }
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if peer.to_local.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if peer.to_local.send(text).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => debug!(address = %address, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = socket.send(Message::Pong(data)).await {
                        warn!(address = %address, error = %e, "Failed to send pong");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(address = %address, "Relay socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(address = %address, error = %e, "Relay socket error");
                    break;
                }
            },
        }
    }
    info!(address = %address, "Relay connection closed");
}
