//! One established relay connection.

use crate::domain::connection_id::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle to a relay socket, shared by its reader task and every queue entry
/// that must answer on it.
#[derive(Debug)]
pub struct RelayPeer {
    id: ConnectionId,
    address: String,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl RelayPeer {
    pub fn new(address: impl Into<String>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            address: address.into(),
            outbound: Mutex::new(Some(outbound)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a frame back to the relay client. False if the socket is gone.
    pub async fn deliver(&self, text: String) -> bool {
        let Some(outbound) = self.outbound.lock().clone() else {
            return false;
        };
        if outbound.send(text).await.is_err() {
            self.mark_dead();
            return false;
        }
        true
    }

    /// Close the socket. Queue entries still holding this peer fail to deliver.
    pub fn close(&self) {
        if self.outbound.lock().take().is_some() {
            debug!(address = %self.address, connection = %self.id, "Closing relay connection");
        }
    }

    /// Forget the socket after the far end went away.
    pub(crate) fn mark_dead(&self) {
        self.outbound.lock().take();
    }
}
