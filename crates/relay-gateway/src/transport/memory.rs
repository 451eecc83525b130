//! In-process relay connector for tests and embedding.
//!
//! An address is reachable once something called [`MemoryConnector::listen`]
//! on it; every successful `connect` hands the far end of a fresh link to the
//! listener's receiver.

use crate::domain::error::TransportError;
use crate::transport::connector::RelayConnector;
use crate::transport::link::{self, LinkPeer, SocketLink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct MemoryConnector {
    buffer: usize,
    listeners: Mutex<HashMap<String, mpsc::UnboundedSender<LinkPeer>>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl MemoryConnector {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            listeners: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Make `address` reachable. Accepted connections arrive on the receiver.
    pub fn listen(&self, address: &str) -> mpsc::UnboundedReceiver<LinkPeer> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().insert(address.to_owned(), tx);
        rx
    }

    /// Number of connection attempts made to `address`, successful or not.
    pub fn attempts(&self, address: &str) -> usize {
        self.attempts.lock().get(address).copied().unwrap_or(0)
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(crate::domain::config::DEFAULT_LINK_BUFFER)
    }
}

#[async_trait]
impl RelayConnector for MemoryConnector {
    async fn connect(&self, address: &str) -> Result<SocketLink, TransportError> {
        *self.attempts.lock().entry(address.to_owned()).or_default() += 1;

        let refused = || TransportError::Connect {
            address: address.to_owned(),
            reason: "connection refused".into(),
        };

        let listener = self.listeners.lock().get(address).cloned().ok_or_else(refused)?;
        let (local, peer) = link::pair(self.buffer);
        listener.send(peer).map_err(|_| refused())?;
        Ok(local)
    }
}
